use std::collections::HashSet;

use coderag_index::store::StoredChunk;

/// Instruction placed at the top of every answer prompt.
pub const SYSTEM_INSTRUCTION: &str = "\
You are a codebase QA assistant. Use ONLY the CONTEXT. \
If you cannot answer, output \"INSUFFICIENT_CONTEXT\". \
When you use a fact, cite it with [chunk:<id>]. Do not cite chunks you didn't use.";

/// Shape the model is asked to answer in.
pub const OUTPUT_FORMAT: &str = "Answer:\n- ...\n\nCitations:\n- chunk:<id>";

/// Sentinel the model returns when the context does not answer the question.
pub const INSUFFICIENT_CONTEXT: &str = "INSUFFICIENT_CONTEXT";

/// One retrieved chunk as presented to the model.
///
/// # Examples
///
/// ```
/// use coderag_answer::prompt::ContextChunk;
///
/// let ctx = ContextChunk {
///     chunk_id: 7,
///     path: "auth/tokens.py".into(),
///     start_line: 3,
///     end_line: 9,
///     content: "def validate_token(token): ...".into(),
/// };
/// assert_eq!(ctx.header(), "[chunk_id=7 path=auth/tokens.py lines=3-9]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextChunk {
    pub chunk_id: i64,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

impl ContextChunk {
    /// Header line identifying the chunk in the context packet.
    pub fn header(&self) -> String {
        format!(
            "[chunk_id={} path={} lines={}-{}]",
            self.chunk_id, self.path, self.start_line, self.end_line
        )
    }
}

impl From<StoredChunk> for ContextChunk {
    fn from(stored: StoredChunk) -> Self {
        Self {
            chunk_id: stored.id,
            path: stored.chunk.path,
            start_line: stored.chunk.start_line,
            end_line: stored.chunk.end_line,
            content: stored.chunk.content,
        }
    }
}

/// Join chunks, each under its header, separated by blank lines.
pub fn format_context_packet(contexts: &[ContextChunk]) -> String {
    contexts
        .iter()
        .map(|c| format!("{}\n{}", c.header(), c.content))
        .collect::<Vec<_>>()
        .join("\n\n")
        .trim()
        .to_string()
}

/// Build the grounded prompt sent to the generative model.
///
/// # Examples
///
/// ```
/// use coderag_answer::prompt::{build_prompt, ContextChunk};
///
/// let prompt = build_prompt("Where are tokens checked?", &[ContextChunk {
///     chunk_id: 1,
///     path: "auth.py".into(),
///     start_line: 1,
///     end_line: 2,
///     content: "def check(): ...".into(),
/// }]);
/// assert!(prompt.starts_with("SYSTEM:\n"));
/// assert!(prompt.contains("QUESTION:\nWhere are tokens checked?\n\n"));
/// assert!(prompt.contains("[chunk_id=1 path=auth.py lines=1-2]"));
/// assert!(prompt.ends_with("- chunk:<id>\n"));
/// ```
pub fn build_prompt(question: &str, contexts: &[ContextChunk]) -> String {
    format!(
        "SYSTEM:\n{SYSTEM_INSTRUCTION}\n\n\
         QUESTION:\n{question}\n\n\
         CONTEXT:\n{}\n\n\
         OUTPUT FORMAT:\n{OUTPUT_FORMAT}\n",
        format_context_packet(contexts)
    )
}

/// Chunk ids cited as `[chunk:<id>]` or `chunk:<id>`, deduplicated, in first-seen order.
///
/// # Examples
///
/// ```
/// use coderag_answer::prompt::parse_citations;
///
/// let text = "Tokens are checked in auth [chunk:12].\n\nCitations:\n- chunk:12\n- chunk:3";
/// assert_eq!(parse_citations(text), vec![12, 3]);
/// ```
pub fn parse_citations(text: &str) -> Vec<i64> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for (pos, marker) in text.match_indices("chunk:") {
        let rest = &text[pos + marker.len()..];
        let digits_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let Ok(id) = rest[..digits_len].parse::<i64>() else {
            continue;
        };
        if seen.insert(id) {
            ids.push(id);
        }
    }
    ids
}
