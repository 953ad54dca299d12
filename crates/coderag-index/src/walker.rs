//! Candidate-file discovery and best-effort text decoding.

use std::path::{Path, PathBuf};

use coderag_core::{CoderagError, IndexConfig};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Directories never indexed, regardless of the root's ignore file.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git/",
    "node_modules/",
    ".venv/",
    "dist/",
    "build/",
    ".next/",
    "__pycache__/",
    "target/",
    ".coderag/",
];

/// Ignore file read from the repository root.
pub const IGNORE_FILE: &str = ".gitignore";

/// A file selected for indexing.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use coderag_index::walker::CandidateFile;
///
/// let file = CandidateFile {
///     absolute: PathBuf::from("/repo/src/app.py"),
///     relative: "src/app.py".into(),
/// };
/// assert_eq!(file.relative, "src/app.py");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Path relative to the repository root, `/`-separated.
    pub relative: String,
}

/// Language tag detected from a file name.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use coderag_index::walker::Language;
///
/// assert_eq!(Language::from_path(Path::new("app.py")), Language::Python);
/// assert_eq!(Language::from_path(Path::new("App.TSX")), Language::Tsx);
/// assert_eq!(Language::from_path(Path::new("notes.txt")), Language::Text);
/// assert_eq!(Language::Tsx.tag(), "typescript");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    TypeScript,
    Tsx,
    JavaScript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Ruby,
    Markdown,
    Json,
    Yaml,
    Toml,
    Env,
    Css,
    Html,
    Sql,
    Text,
}

impl Language {
    /// Detect the language from a path's extension (case-insensitive).
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    /// Detect the language from an extension string (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "py" => Language::Python,
            "ts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hxx" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "md" => Language::Markdown,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "env" => Language::Env,
            "css" => Language::Css,
            "html" => Language::Html,
            "sql" => Language::Sql,
            _ => Language::Text,
        }
    }

    /// Tag stored with each chunk.
    pub fn tag(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript | Language::Tsx => "typescript",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Markdown => "markdown",
            Language::Json => "json",
            Language::Yaml => "yaml",
            Language::Toml => "toml",
            Language::Env => "env",
            Language::Css => "css",
            Language::Html => "html",
            Language::Sql => "sql",
            Language::Text => "text",
        }
    }

    /// Get the tree-sitter grammar for this language.
    ///
    /// Returns `None` for languages without a structural grammar.
    pub fn tree_sitter_language(self) -> Option<tree_sitter::Language> {
        match self {
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::C => Some(tree_sitter_c::LANGUAGE.into()),
            Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
            Language::Ruby => Some(tree_sitter_ruby::LANGUAGE.into()),
            _ => None,
        }
    }
}

/// Whether a file is worth indexing as text, judged by its name alone.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use coderag_index::walker::is_probably_text;
///
/// assert!(is_probably_text(Path::new("src/app.py")));
/// assert!(is_probably_text(Path::new("notes.txt")));
/// assert!(is_probably_text(Path::new(".env.example")));
/// assert!(is_probably_text(Path::new(".editorconfig")));
/// assert!(!is_probably_text(Path::new("logo.png")));
/// assert!(!is_probably_text(Path::new("Makefile")));
/// ```
pub fn is_probably_text(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if name.ends_with(".env.example") {
        return true;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        // dotfiles such as `.env` have no extension
        return name.starts_with('.');
    };
    let ext = ext.to_ascii_lowercase();
    ext == "txt" || Language::from_extension(&ext) != Language::Text
}

/// Canonical identity of a repository root, as stored in the index.
///
/// # Errors
///
/// Returns [`CoderagError::FileNotFound`] if `root` does not exist.
pub fn repo_key(root: &Path) -> Result<String, CoderagError> {
    Ok(canonical_root(root)?.to_string_lossy().into_owned())
}

pub(crate) fn canonical_root(root: &Path) -> Result<PathBuf, CoderagError> {
    root.canonicalize().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CoderagError::FileNotFound(root.to_path_buf()),
        _ => CoderagError::Io(e),
    })
}

/// Build the ignore matcher: built-in set, configured extras, then the root ignore file.
///
/// # Errors
///
/// Returns [`CoderagError::Config`] if a pattern or the ignore file is malformed.
pub fn build_ignore(root: &Path, extra: &[String]) -> Result<Gitignore, CoderagError> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in DEFAULT_IGNORES
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
    {
        builder
            .add_line(None, pattern)
            .map_err(|e| CoderagError::Config(format!("invalid ignore pattern '{pattern}': {e}")))?;
    }

    let ignore_file = root.join(IGNORE_FILE);
    if ignore_file.is_file() {
        if let Some(e) = builder.add(&ignore_file) {
            tracing::warn!(path = %ignore_file.display(), "partially invalid ignore file: {e}");
        }
    }

    builder
        .build()
        .map_err(|e| CoderagError::Config(format!("failed to build ignore rules: {e}")))
}

/// Enumerate candidate files under `root`, sorted by relative path.
///
/// Skips ignored paths, names outside the text allowlist, and files larger
/// than `config.max_file_bytes`. `root` must already be canonical.
///
/// # Errors
///
/// Returns [`CoderagError::Config`] if the ignore rules cannot be built.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use coderag_core::IndexConfig;
/// use coderag_index::walker::discover;
///
/// let files = discover(Path::new("/abs/repo"), &IndexConfig::default()).unwrap();
/// for f in &files {
///     println!("{}", f.relative);
/// }
/// ```
pub fn discover(root: &Path, config: &IndexConfig) -> Result<Vec<CandidateFile>, CoderagError> {
    let matcher = build_ignore(root, &config.extra_ignores)?;

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !matcher.matched(entry.path(), is_dir).is_ignore()
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("skipping unreadable directory entry: {e}");
                continue;
            }
        };

        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        if !is_probably_text(path) {
            continue;
        }

        match entry.metadata() {
            Ok(m) if m.len() > config.max_file_bytes => {
                tracing::debug!(path = %path.display(), size = m.len(), "file too large, skipping");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot stat file: {e}");
                continue;
            }
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };

        files.push(CandidateFile {
            absolute: path.to_path_buf(),
            relative: posix_path(relative),
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Read a file as text, dropping invalid UTF-8 sequences instead of failing.
///
/// # Errors
///
/// Returns the underlying I/O error if the file cannot be read.
pub fn read_text(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_lossy(&bytes))
}

/// Decode bytes as UTF-8, dropping invalid sequences.
///
/// # Examples
///
/// ```
/// use coderag_index::walker::decode_lossy;
///
/// assert_eq!(decode_lossy(b"ab\xffcd"), "abcd");
/// ```
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

fn posix_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
