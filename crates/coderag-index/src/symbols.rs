//! Symbol table derived from chunk metadata, and the reference heuristic.

use coderag_core::{CoderagError, SymbolKind};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::store::CodeIndex;

/// A named declaration's location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    pub name: String,
    pub kind: SymbolKind,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub chunk_id: i64,
}

/// A line that mentions a name without declaring it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub path: String,
    /// Absolute line number in the file (1-indexed).
    pub line: u32,
    /// The line, trimmed.
    pub text: String,
}

/// Rebuild a repository's symbol entries from its current chunks.
///
/// Every chunk with a non-empty symbol name yields one entry. The old entries
/// are dropped and the new ones written in a single transaction.
///
/// # Errors
///
/// Returns [`CoderagError::Database`] on failure; the previous table is kept.
pub fn rebuild(index: &mut CodeIndex, repo_root: &str) -> Result<usize, CoderagError> {
    let tx = index
        .conn_mut()
        .transaction()
        .map_err(|e| CoderagError::Database(format!("failed to begin transaction: {e}")))?;

    tx.execute("DELETE FROM symbols WHERE repo_root = ?1", params![repo_root])
        .map_err(|e| CoderagError::Database(format!("failed to clear symbols: {e}")))?;

    let inserted = tx
        .execute(
            "INSERT INTO symbols
             (repo_root, symbol_name, symbol_kind, path, start_line, end_line, chunk_id)
             SELECT repo_root, symbol_name, symbol_kind, path, start_line, end_line, id
             FROM chunks
             WHERE repo_root = ?1
               AND symbol_name IS NOT NULL AND symbol_name != ''
               AND symbol_kind IS NOT NULL",
            params![repo_root],
        )
        .map_err(|e| CoderagError::Database(format!("failed to rebuild symbols: {e}")))?;

    tx.commit()
        .map_err(|e| CoderagError::Database(format!("failed to commit symbols: {e}")))?;

    tracing::debug!(repo_root, symbols = inserted, "rebuilt symbol table");
    Ok(inserted)
}

/// Exact-name definition lookup, ordered by kind, path, then start line.
///
/// # Errors
///
/// Returns [`CoderagError::Database`] on query failure.
///
/// # Examples
///
/// ```
/// use coderag_index::chunker::Chunker;
/// use coderag_index::store::CodeIndex;
/// use coderag_index::symbols::{find_definitions, rebuild};
///
/// let mut index = CodeIndex::in_memory().unwrap();
/// let text = "import os\n\ndef login(user):\n    check(user)\n    return True\n";
/// let rows: Vec<_> = Chunker::default()
///     .chunk("auth.py", text)
///     .into_iter()
///     .map(|c| (c, None))
///     .collect();
/// index.insert_chunks("/repo", &rows).unwrap();
/// rebuild(&mut index, "/repo").unwrap();
///
/// let defs = find_definitions(&index, "/repo", "login", 10).unwrap();
/// assert_eq!(defs.len(), 1);
/// assert_eq!(defs[0].start_line, 3);
/// ```
pub fn find_definitions(
    index: &CodeIndex,
    repo_root: &str,
    name: &str,
    k: usize,
) -> Result<Vec<SymbolEntry>, CoderagError> {
    let mut stmt = index
        .conn()
        .prepare(
            "SELECT symbol_name, symbol_kind, path, start_line, end_line, chunk_id
             FROM symbols
             WHERE repo_root = ?1 AND symbol_name = ?2
             ORDER BY symbol_kind, path, start_line
             LIMIT ?3",
        )
        .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map(params![repo_root, name, k as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })
        .map_err(|e| CoderagError::Database(format!("failed to query symbols: {e}")))?;

    let mut entries = Vec::new();
    for row in rows {
        let (name, kind, path, start_line, end_line, chunk_id) =
            row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?;
        let kind = kind
            .parse::<SymbolKind>()
            .map_err(|e| CoderagError::Database(format!("corrupted symbol row: {e}")))?;
        entries.push(SymbolEntry {
            name,
            kind,
            path,
            start_line,
            end_line,
            chunk_id,
        });
    }
    Ok(entries)
}

/// Substring scan for lines mentioning `name`, skipping lines that contain
/// `def ` or `class `. Stops once `k` lines are found.
///
/// Matches inside longer identifiers are reported, and calls split across
/// chunk boundaries can be missed. Overlapping windows can report a line twice.
///
/// # Errors
///
/// Returns [`CoderagError::Database`] on query failure.
pub fn find_references(
    index: &CodeIndex,
    repo_root: &str,
    name: &str,
    k: usize,
) -> Result<Vec<Reference>, CoderagError> {
    if name.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let mut refs = Vec::new();
    for stored in index.chunks(repo_root)? {
        let chunk = &stored.chunk;
        for (offset, line) in chunk.content.lines().enumerate() {
            if !line.contains(name) || is_definition_line(line) {
                continue;
            }
            refs.push(Reference {
                path: chunk.path.clone(),
                line: chunk.start_line + offset as u32,
                text: line.trim().to_string(),
            });
            if refs.len() >= k {
                return Ok(refs);
            }
        }
    }
    Ok(refs)
}

fn is_definition_line(line: &str) -> bool {
    line.contains("def ") || line.contains("class ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{content_hash, Chunk};

    const REPO: &str = "/repo";

    fn chunk(path: &str, start: u32, content: &str, symbol: Option<(SymbolKind, &str)>) -> Chunk {
        Chunk {
            path: path.into(),
            start_line: start,
            end_line: start + content.lines().count() as u32 - 1,
            language: "python".into(),
            content: content.into(),
            content_hash: content_hash(content),
            symbol_kind: symbol.map(|(k, _)| k),
            symbol_name: symbol.map(|(_, n)| n.to_string()),
        }
    }

    fn seeded_index() -> CodeIndex {
        let mut index = CodeIndex::in_memory().unwrap();
        let rows = vec![
            (chunk("b.py", 1, "import a\n\nrun()\nrun()", None), None),
            (
                chunk(
                    "b.py",
                    10,
                    "def run():\n    helper()\n    return 1",
                    Some((SymbolKind::Function, "run")),
                ),
                None,
            ),
            (
                chunk(
                    "a.py",
                    4,
                    "class run:\n    pass\n    x = 1",
                    Some((SymbolKind::Class, "run")),
                ),
                None,
            ),
            (
                chunk("a.py", 20, "def other():\n    run()\n    return", Some((SymbolKind::Function, ""))),
                None,
            ),
        ];
        index.insert_chunks(REPO, &rows).unwrap();
        rebuild(&mut index, REPO).unwrap();
        index
    }

    #[test]
    fn rebuild_skips_unnamed_chunks() {
        let index = seeded_index();
        assert_eq!(index.stats(REPO).unwrap().total_symbols, 2);
    }

    #[test]
    fn definitions_are_ordered_by_kind_then_path() {
        let index = seeded_index();
        let defs = find_definitions(&index, REPO, "run", 10).unwrap();
        let summary: Vec<(SymbolKind, &str, u32)> = defs
            .iter()
            .map(|d| (d.kind, d.path.as_str(), d.start_line))
            .collect();
        assert_eq!(
            summary,
            vec![(SymbolKind::Class, "a.py", 4), (SymbolKind::Function, "b.py", 10)]
        );
    }

    #[test]
    fn definitions_respect_limit_and_exact_name() {
        let index = seeded_index();
        assert_eq!(find_definitions(&index, REPO, "run", 1).unwrap().len(), 1);
        assert!(find_definitions(&index, REPO, "ru", 10).unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_previous_entries() {
        let mut index = seeded_index();
        index.delete_path(REPO, "a.py").unwrap();
        rebuild(&mut index, REPO).unwrap();
        let defs = find_definitions(&index, REPO, "run", 10).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].path, "b.py");
    }

    #[test]
    fn references_skip_definition_lines() {
        let index = seeded_index();
        let refs = find_references(&index, REPO, "run", 20).unwrap();
        let locations: Vec<(&str, u32)> = refs.iter().map(|r| (r.path.as_str(), r.line)).collect();
        assert_eq!(locations, vec![("a.py", 21), ("b.py", 3), ("b.py", 4)]);
        assert!(refs.iter().all(|r| r.text == "run()"));
    }

    #[test]
    fn references_stop_at_limit() {
        let index = seeded_index();
        assert_eq!(find_references(&index, REPO, "run", 2).unwrap().len(), 2);
    }

    #[test]
    fn empty_name_finds_nothing() {
        let index = seeded_index();
        assert!(find_references(&index, REPO, "", 20).unwrap().is_empty());
    }
}
