//! Retrieval engines: lexical, vector, and hybrid (vector recall + lexical rerank).
//!
//! All three return hits sorted by descending score, ties broken by ascending
//! chunk id, so the output does not depend on row fetch order.

use std::cmp::Ordering;

use coderag_core::CoderagError;
use serde::{Deserialize, Serialize};

use crate::embedding::{self, Embedder};
use crate::store::{CodeIndex, StoredChunk};

/// Words dropped from questions before lexical scoring.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "have", "how", "i",
    "in", "is", "it", "its", "me", "of", "on", "or", "that", "the", "this", "to", "was", "were",
    "what", "when", "where", "which", "who", "why", "with", "do", "does", "did",
];

const PREVIEW_LINES: usize = 30;
const DEFINITION_SCAN_LINES: usize = 200;
const DEFINITION_PREFIXES: &[&str] = &["def ", "class ", "export ", "function ", "const ", "let "];

const PATH_WEIGHT: u32 = 6;
const DEFINITION_WEIGHT: u32 = 5;
const CONTENT_WEIGHT: u32 = 2;

/// Which engine produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Lexical,
    Vector,
    Hybrid,
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub chunk_id: i64,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Final score used for ranking.
    pub score: f64,
    /// Vector similarity, for vector and hybrid hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cosine: Option<f64>,
    /// Lexical score, for lexical and hybrid hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical: Option<u32>,
    /// Which tokens fired, for lexical and hybrid hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
    /// First lines of the chunk.
    pub preview: String,
    pub source: SearchSource,
}

/// Lexical score of one chunk and the tokens that contributed to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LexicalScore {
    pub score: u32,
    pub matched: Vec<String>,
}

impl LexicalScore {
    /// Human-readable explanation of which tokens fired.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderag_index::search::LexicalScore;
    ///
    /// let hit = LexicalScore { score: 13, matched: vec!["token".into()] };
    /// assert_eq!(hit.why(), "matched=[token]");
    /// assert_eq!(LexicalScore::default().why(), "no token overlap");
    /// ```
    pub fn why(&self) -> String {
        if self.matched.is_empty() {
            "no token overlap".to_string()
        } else {
            format!("matched=[{}]", self.matched.join(", "))
        }
    }
}

/// Lowercase word/underscore tokens of a question, stopwords removed.
///
/// Repeated tokens are kept and each occurrence contributes to the score.
///
/// # Examples
///
/// ```
/// use coderag_index::search::tokenize;
///
/// assert_eq!(tokenize("Where is validate_token defined?"), vec!["validate_token", "defined"]);
/// assert!(tokenize("what is the").is_empty());
/// ```
pub fn tokenize(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Score a chunk against question tokens.
///
/// Each token adds 6 if it is a substring of the lowercased path, 5 if it
/// appears in a definition-like line among the first 200, and 2 if it appears
/// anywhere in the lowercased content.
pub fn lexical_score(content: &str, tokens: &[String], path: &str) -> LexicalScore {
    let text = content.to_lowercase();
    let path = path.to_lowercase();
    let definitions = text
        .lines()
        .take(DEFINITION_SCAN_LINES)
        .filter(|line| is_definition_like(line))
        .collect::<Vec<_>>()
        .join("\n");

    let mut result = LexicalScore::default();
    for token in tokens {
        let token = token.as_str();
        let mut gained = 0;
        if path.contains(token) {
            gained += PATH_WEIGHT;
        }
        if definitions.contains(token) {
            gained += DEFINITION_WEIGHT;
        }
        if text.contains(token) {
            gained += CONTENT_WEIGHT;
        }
        if gained > 0 {
            result.score += gained;
            result.matched.push(token.to_string());
        }
    }
    result
}

fn is_definition_like(line: &str) -> bool {
    let trimmed = line.trim_start();
    DEFINITION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || line.contains("->")
        || line.contains("validate")
}

/// Fused hybrid score: cosine plus the lexical score compressed by 10 and weighted 1.5.
///
/// # Examples
///
/// ```
/// use coderag_index::search::fuse;
///
/// assert!((fuse(0.5, 10) - 2.0).abs() < 1e-9);
/// ```
pub fn fuse(cosine: f64, lexical: u32) -> f64 {
    cosine + (f64::from(lexical) / 10.0) * 1.5
}

/// First 30 lines of a chunk.
pub fn preview(content: &str) -> String {
    content
        .lines()
        .take(PREVIEW_LINES)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Score every chunk of the repository lexically.
///
/// A question with no tokens, or a chunk scoring zero, produces no hit.
///
/// # Errors
///
/// Returns [`CoderagError::Database`] if chunks cannot be read.
pub fn search_lexical(
    index: &CodeIndex,
    repo_root: &str,
    question: &str,
    k: usize,
) -> Result<Vec<SearchHit>, CoderagError> {
    let tokens = tokenize(question);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }
    Ok(rank_lexical(index.chunks(repo_root)?, &tokens, k))
}

/// Pure ranking step of [`search_lexical`].
pub fn rank_lexical(rows: Vec<StoredChunk>, tokens: &[String], k: usize) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = rows
        .into_iter()
        .filter_map(|row| {
            let lex = lexical_score(&row.chunk.content, tokens, &row.chunk.path);
            (lex.score > 0).then(|| {
                let mut hit = hit_from(row, f64::from(lex.score), SearchSource::Lexical);
                hit.why = Some(lex.why());
                hit.lexical = Some(lex.score);
                hit
            })
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(k);
    hits
}

/// Rank embedded chunks by similarity to the embedded question.
///
/// Embeds nothing when the repository has no embedded chunks.
///
/// # Errors
///
/// Returns [`CoderagError::Embedding`] if the question cannot be embedded,
/// or [`CoderagError::Database`] if chunks cannot be read.
pub async fn search_vector<E: Embedder>(
    index: &CodeIndex,
    embedder: &E,
    repo_root: &str,
    question: &str,
    k: usize,
) -> Result<Vec<SearchHit>, CoderagError> {
    let rows = index.embedded_chunks(repo_root)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let query = embedding::embed_query(embedder, question).await?;
    Ok(rank_vector(&query, rows, k))
}

/// Pure ranking step of [`search_vector`]. Rows of another dimension are skipped.
pub fn rank_vector(query: &[f32], rows: Vec<(StoredChunk, Vec<f32>)>, k: usize) -> Vec<SearchHit> {
    cosine_ranked(query, rows)
        .into_iter()
        .take(k)
        .map(|(cosine, row)| {
            let mut hit = hit_from(row, cosine, SearchSource::Vector);
            hit.cosine = Some(cosine);
            hit
        })
        .collect()
}

/// Vector recall of the top `max(candidates, k)` chunks, lexical rerank, fused score.
///
/// # Errors
///
/// Returns [`CoderagError::Embedding`] if the question cannot be embedded,
/// or [`CoderagError::Database`] if chunks cannot be read.
pub async fn search_hybrid<E: Embedder>(
    index: &CodeIndex,
    embedder: &E,
    repo_root: &str,
    question: &str,
    k: usize,
    candidates: usize,
) -> Result<Vec<SearchHit>, CoderagError> {
    let rows = index.embedded_chunks(repo_root)?;
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let query = embedding::embed_query(embedder, question).await?;
    Ok(rank_hybrid(&query, rows, &tokenize(question), k, candidates))
}

/// Pure ranking step of [`search_hybrid`].
///
/// # Examples
///
/// ```
/// use coderag_index::chunker::{content_hash, Chunk};
/// use coderag_index::search::{rank_hybrid, tokenize};
/// use coderag_index::store::StoredChunk;
///
/// let row = |id: i64, path: &str, content: &str| StoredChunk {
///     id,
///     chunk: Chunk {
///         path: path.into(),
///         start_line: 1,
///         end_line: 1,
///         language: "python".into(),
///         content: content.into(),
///         content_hash: content_hash(content),
///         symbol_kind: None,
///         symbol_name: None,
///     },
/// };
/// let rows = vec![
///     (row(1, "a.py", "x = 1"), vec![1.0, 0.0]),
///     (row(2, "tokens.py", "def check(): pass"), vec![0.8, 0.6]),
/// ];
/// let hits = rank_hybrid(&[1.0, 0.0], rows, &tokenize("tokens"), 2, 30);
/// assert_eq!(hits[0].chunk_id, 2);
/// ```
pub fn rank_hybrid(
    query: &[f32],
    rows: Vec<(StoredChunk, Vec<f32>)>,
    tokens: &[String],
    k: usize,
    candidates: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = cosine_ranked(query, rows)
        .into_iter()
        .take(candidates.max(k))
        .map(|(cosine, row)| {
            let lex = lexical_score(&row.chunk.content, tokens, &row.chunk.path);
            let mut hit = hit_from(row, fuse(cosine, lex.score), SearchSource::Hybrid);
            hit.cosine = Some(cosine);
            hit.lexical = Some(lex.score);
            hit.why = Some(lex.why());
            hit
        })
        .collect();
    sort_hits(&mut hits);
    hits.truncate(k);
    hits
}

/// Cosine score of every same-dimension row, best first.
fn cosine_ranked(query: &[f32], rows: Vec<(StoredChunk, Vec<f32>)>) -> Vec<(f64, StoredChunk)> {
    let mut scored: Vec<(f64, StoredChunk)> = rows
        .into_iter()
        .filter(|(_, vector)| vector.len() == query.len())
        .map(|(row, vector)| (embedding::dot(query, &vector), row))
        .collect();
    scored.sort_by(|a, b| rank_order((a.0, a.1.id), (b.0, b.1.id)));
    scored
}

fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| rank_order((a.score, a.chunk_id), (b.score, b.chunk_id)));
}

fn rank_order(a: (f64, i64), b: (f64, i64)) -> Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1))
}

fn hit_from(row: StoredChunk, score: f64, source: SearchSource) -> SearchHit {
    SearchHit {
        chunk_id: row.id,
        preview: preview(&row.chunk.content),
        path: row.chunk.path,
        start_line: row.chunk.start_line,
        end_line: row.chunk.end_line,
        score,
        cosine: None,
        lexical: None,
        why: None,
        source,
    }
}
