//! Splitting one file's text into content-hashed chunks.
//!
//! Two strategies, never mixed within a file: structural chunking over a
//! tree-sitter parse (a header chunk plus one chunk per tracked declaration),
//! and fixed-size overlapping line windows. Structural chunking is tried first
//! when the language has a grammar; any [`ChunkError`] falls through to windows.

use std::path::Path;

use coderag_core::{ChunkingConfig, SymbolKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tree_sitter::{Node, Parser};

use crate::walker::Language;

/// A contiguous, self-describing span of a source file.
///
/// # Examples
///
/// ```
/// use coderag_index::chunker::{content_hash, Chunk};
///
/// let chunk = Chunk {
///     path: "src/auth.py".into(),
///     start_line: 3,
///     end_line: 9,
///     language: "python".into(),
///     content: "def login(): ...".into(),
///     content_hash: content_hash("def login(): ..."),
///     symbol_kind: None,
///     symbol_name: None,
/// };
/// assert_eq!(chunk.line_count(), 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Path relative to the repository root, `/`-separated.
    pub path: String,
    /// First line of the chunk (1-indexed).
    pub start_line: u32,
    /// Last line of the chunk (1-indexed, inclusive).
    pub end_line: u32,
    /// Language tag.
    pub language: String,
    /// Raw text.
    pub content: String,
    /// SHA-256 of `content`; the unit of change detection.
    pub content_hash: String,
    /// Declaration kind, for structural chunks that carry one.
    pub symbol_kind: Option<SymbolKind>,
    /// Declaration name, present only together with `symbol_kind`.
    pub symbol_name: Option<String>,
}

impl Chunk {
    /// Number of lines spanned.
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

/// Why structural chunking gave up on a file.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// No grammar exists for the language.
    #[error("no structural grammar for {0}")]
    UnsupportedLanguage(&'static str),

    /// The grammar could not be loaded into the parser.
    #[error("grammar unavailable: {0}")]
    Grammar(String),

    /// The parser produced no tree.
    #[error("parser produced no syntax tree")]
    ParseFailed,

    /// Only the header (or nothing) was found.
    #[error("structural pass produced {0} chunk(s), need at least 2")]
    TooFewChunks(usize),
}

/// Node type mapped to the symbol kind it is tagged with.
pub type TrackedKind = (&'static str, Option<SymbolKind>);

const PYTHON_KINDS: &[TrackedKind] = &[
    ("function_definition", Some(SymbolKind::Function)),
    ("class_definition", Some(SymbolKind::Class)),
];

const JS_TS_KINDS: &[TrackedKind] = &[
    ("function_declaration", Some(SymbolKind::Function)),
    ("generator_function_declaration", Some(SymbolKind::Function)),
    ("method_definition", Some(SymbolKind::Method)),
    ("class_declaration", Some(SymbolKind::Class)),
    ("abstract_class_declaration", Some(SymbolKind::Class)),
    // tagged only when it binds a function value
    ("lexical_declaration", None),
];

const RUST_KINDS: &[TrackedKind] = &[
    ("function_item", Some(SymbolKind::Function)),
    ("struct_item", Some(SymbolKind::Class)),
    ("enum_item", Some(SymbolKind::Class)),
    ("trait_item", Some(SymbolKind::Class)),
];

const GO_KINDS: &[TrackedKind] = &[
    ("function_declaration", Some(SymbolKind::Function)),
    ("method_declaration", Some(SymbolKind::Method)),
    ("type_declaration", Some(SymbolKind::Class)),
];

const JAVA_KINDS: &[TrackedKind] = &[
    ("class_declaration", Some(SymbolKind::Class)),
    ("interface_declaration", Some(SymbolKind::Class)),
    ("enum_declaration", Some(SymbolKind::Class)),
    ("method_declaration", Some(SymbolKind::Method)),
    ("constructor_declaration", Some(SymbolKind::Method)),
];

const C_KINDS: &[TrackedKind] = &[
    ("function_definition", Some(SymbolKind::Function)),
    ("struct_specifier", Some(SymbolKind::Class)),
];

const CPP_KINDS: &[TrackedKind] = &[
    ("function_definition", Some(SymbolKind::Function)),
    ("class_specifier", Some(SymbolKind::Class)),
    ("struct_specifier", Some(SymbolKind::Class)),
];

const RUBY_KINDS: &[TrackedKind] = &[
    ("method", Some(SymbolKind::Method)),
    ("singleton_method", Some(SymbolKind::Method)),
    ("class", Some(SymbolKind::Class)),
    ("module", Some(SymbolKind::Class)),
];

const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "property_identifier",
    "type_identifier",
    "field_identifier",
    "constant",
];

/// Chunking strategy for one file, chosen from its language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Parse and emit a header plus one chunk per tracked declaration.
    Structural(&'static [TrackedKind]),
    /// Fixed-size overlapping line windows.
    Window,
}

impl Strategy {
    /// Pick the strategy for a language.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderag_index::chunker::Strategy;
    /// use coderag_index::walker::Language;
    ///
    /// assert!(matches!(Strategy::for_language(Language::Python), Strategy::Structural(_)));
    /// assert_eq!(Strategy::for_language(Language::Markdown), Strategy::Window);
    /// ```
    pub fn for_language(language: Language) -> Self {
        let tracked = match language {
            Language::Python => PYTHON_KINDS,
            Language::JavaScript | Language::TypeScript | Language::Tsx => JS_TS_KINDS,
            Language::Rust => RUST_KINDS,
            Language::Go => GO_KINDS,
            Language::Java => JAVA_KINDS,
            Language::C => C_KINDS,
            Language::Cpp => CPP_KINDS,
            Language::Ruby => RUBY_KINDS,
            _ => return Strategy::Window,
        };
        Strategy::Structural(tracked)
    }
}

/// Splits files into chunks according to a [`ChunkingConfig`].
///
/// # Examples
///
/// ```
/// use coderag_core::ChunkingConfig;
/// use coderag_index::chunker::Chunker;
///
/// let chunker = Chunker::new(ChunkingConfig::default());
/// let chunks = chunker.chunk("notes.md", "# Title\n\nSome text.");
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].start_line, 1);
/// assert_eq!(chunks[0].end_line, 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker with the given parameters.
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Chunk one file's text. Never fails: structural errors fall back to windows.
    ///
    /// Chunks are ordered by `(start_line, end_line)`, except that a structural
    /// header chunk is always first.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<Chunk> {
        let language = Language::from_path(Path::new(path));
        let strategy = Strategy::for_language(language);
        match self.chunk_with(strategy, path, text) {
            Ok(chunks) => chunks,
            Err(e) => {
                tracing::debug!(path, "structural chunking fell back to windows: {e}");
                self.window_chunks(path, text, language)
            }
        }
    }

    /// Run a single strategy without fallback.
    ///
    /// # Errors
    ///
    /// Returns a [`ChunkError`] when the structural strategy cannot produce a
    /// useful result. The window strategy never fails.
    pub fn chunk_with(
        &self,
        strategy: Strategy,
        path: &str,
        text: &str,
    ) -> Result<Vec<Chunk>, ChunkError> {
        let language = Language::from_path(Path::new(path));
        match strategy {
            Strategy::Structural(tracked) => self.structural_chunks(path, text, language, tracked),
            Strategy::Window => Ok(self.window_chunks(path, text, language)),
        }
    }

    fn structural_chunks(
        &self,
        path: &str,
        text: &str,
        language: Language,
        tracked: &[TrackedKind],
    ) -> Result<Vec<Chunk>, ChunkError> {
        let ts_language = language
            .tree_sitter_language()
            .ok_or(ChunkError::UnsupportedLanguage(language.tag()))?;

        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| ChunkError::Grammar(e.to_string()))?;
        let tree = parser.parse(text, None).ok_or(ChunkError::ParseFailed)?;

        let tag = language.tag();
        let header = self.header_chunk(path, text, tag);

        let mut declarations = Vec::new();
        collect_declarations(
            tree.root_node(),
            text.as_bytes(),
            tracked,
            self.config.min_node_lines,
            &mut |node, kind, name| {
                let content = node_text(&node, text.as_bytes());
                let content = content.trim();
                if content.is_empty() {
                    return;
                }
                declarations.push(make_chunk(
                    path,
                    node.start_position().row + 1,
                    node.end_position().row + 1,
                    tag,
                    content.to_string(),
                    kind.map(|k| (k, name)),
                ));
            },
        );

        let total = declarations.len() + usize::from(header.is_some());
        if total < 2 {
            return Err(ChunkError::TooFewChunks(total));
        }

        declarations.sort_by_key(|c| (c.start_line, c.end_line));
        Ok(header.into_iter().chain(declarations).collect())
    }

    fn header_chunk(&self, path: &str, text: &str, tag: &str) -> Option<Chunk> {
        let lines: Vec<&str> = text.lines().take(self.config.header_lines).collect();
        let content = lines.join("\n");
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        Some(make_chunk(path, 1, lines.len(), tag, content.to_string(), None))
    }

    fn window_chunks(&self, path: &str, text: &str, language: Language) -> Vec<Chunk> {
        let lines: Vec<&str> = text.lines().collect();
        let n = lines.len();
        let tag = language.tag();

        if n <= self.config.small_file_lines {
            return vec![make_chunk(path, 1, n.max(1), tag, lines.join("\n"), None)];
        }

        let max_lines = self.config.max_lines.max(1);
        let step = max_lines.saturating_sub(self.config.overlap).max(1);

        let mut chunks = Vec::new();
        let mut start = 0;
        loop {
            let end = (start + max_lines).min(n);
            chunks.push(make_chunk(
                path,
                start + 1,
                end,
                tag,
                lines[start..end].join("\n"),
                None,
            ));
            if end == n {
                break;
            }
            start += step;
        }
        chunks
    }
}

/// SHA-256 hex digest of chunk content.
///
/// # Examples
///
/// ```
/// use coderag_index::chunker::content_hash;
///
/// assert_eq!(content_hash("abc"), content_hash("abc"));
/// assert_ne!(content_hash("abc"), content_hash("abd"));
/// assert_eq!(content_hash("").len(), 64);
/// ```
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(
    path: &str,
    start_line: usize,
    end_line: usize,
    language: &str,
    content: String,
    symbol: Option<(SymbolKind, String)>,
) -> Chunk {
    let (symbol_kind, symbol_name) = match symbol {
        Some((kind, name)) if !name.is_empty() => (Some(kind), Some(name)),
        Some((kind, _)) => (Some(kind), None),
        None => (None, None),
    };
    Chunk {
        path: path.to_string(),
        start_line: start_line as u32,
        end_line: end_line as u32,
        language: language.to_string(),
        content_hash: content_hash(&content),
        content,
        symbol_kind,
        symbol_name,
    }
}

fn collect_declarations<F>(
    node: Node,
    source: &[u8],
    tracked: &[TrackedKind],
    min_lines: usize,
    emit: &mut F,
) where
    F: FnMut(Node, Option<SymbolKind>, String),
{
    if let Some((_, kind)) = tracked.iter().find(|(k, _)| *k == node.kind()) {
        let lines = node.end_position().row - node.start_position().row + 1;
        if lines >= min_lines {
            let kind = (*kind).or_else(|| binds_function(&node).then_some(SymbolKind::Function));
            let name = match kind {
                Some(_) => symbol_name(&node, source),
                None => String::new(),
            };
            emit(node, kind, name);
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_declarations(child, source, tracked, min_lines, emit);
    }
}

/// `const f = () => {}` and `let g = function () {}` count as functions.
fn binds_function(node: &Node) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| {
        child.kind() == "variable_declarator"
            && child.child_by_field_name("value").is_some_and(|value| {
                matches!(
                    value.kind(),
                    "arrow_function" | "function_expression" | "function" | "generator_function"
                )
            })
    });
    found
}

fn symbol_name(node: &Node, source: &[u8]) -> String {
    if let Some(name) = node.child_by_field_name("name") {
        return node_text(&name, source);
    }
    // C and C++ keep the name inside nested declarators
    let mut declarator = node.child_by_field_name("declarator");
    while let Some(d) = declarator {
        if IDENTIFIER_KINDS.contains(&d.kind()) {
            return node_text(&d, source);
        }
        declarator = d.child_by_field_name("declarator");
    }
    find_identifier(*node)
        .map(|ident| node_text(&ident, source))
        .unwrap_or_default()
}

fn find_identifier(node: Node) -> Option<Node> {
    if IDENTIFIER_KINDS.contains(&node.kind()) {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(find_identifier)
}

fn node_text(node: &Node, source: &[u8]) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    if start > end || end > source.len() {
        return String::new();
    }
    String::from_utf8_lossy(&source[start..end]).to_string()
}
