//! SQLite storage for chunks, embeddings, and the derived symbol table.
//!
//! Rows are scoped by repository root and keyed logically by
//! `(repo_root, path, content_hash)`. Embeddings are stored as little-endian
//! `f32` BLOBs; similarity is computed in Rust by the retrieval engines.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use coderag_core::{CoderagError, SymbolKind};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::embedding;

const DIMENSIONS_KEY: &str = "embedding_dimensions";

const CHUNK_COLUMNS: &str = "id, path, start_line, end_line, language, content, content_hash, \
                             symbol_kind, symbol_name";

/// A chunk row as persisted, with its identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    /// Row identifier, cited in answers as `chunk:<id>`.
    pub id: i64,
    /// The chunk itself.
    #[serde(flatten)]
    pub chunk: Chunk,
}

/// All chunk rows for one path, replacing whatever was stored for it.
#[derive(Debug, Clone)]
pub struct PathReplacement {
    /// Relative path being rewritten.
    pub path: String,
    /// New chunks, each with its embedding when one was produced.
    pub rows: Vec<(Chunk, Option<Vec<f32>>)>,
}

/// Per-repository index statistics.
///
/// # Examples
///
/// ```
/// use coderag_index::store::IndexStats;
///
/// let stats = IndexStats {
///     total_chunks: 100,
///     total_files: 10,
///     embedded_chunks: 100,
///     total_symbols: 42,
///     embedding_dimensions: Some(1536),
///     index_size_bytes: 50000,
/// };
/// assert_eq!(stats.total_chunks, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    /// Chunk rows for the repository.
    pub total_chunks: usize,
    /// Distinct indexed paths for the repository.
    pub total_files: usize,
    /// Chunk rows carrying an embedding.
    pub embedded_chunks: usize,
    /// Symbol entries for the repository.
    pub total_symbols: usize,
    /// Embedding dimension recorded for the database, if any.
    pub embedding_dimensions: Option<usize>,
    /// Size of the database file in bytes (whole database, all repositories).
    pub index_size_bytes: u64,
}

/// SQLite-backed chunk index.
///
/// # Examples
///
/// ```
/// use coderag_index::store::CodeIndex;
///
/// let index = CodeIndex::in_memory().unwrap();
/// let stats = index.stats("/repo").unwrap();
/// assert_eq!(stats.total_chunks, 0);
/// ```
pub struct CodeIndex {
    conn: Connection,
}

impl std::fmt::Debug for CodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIndex")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl CodeIndex {
    /// Open or create an index database at the given path.
    ///
    /// Creates the parent directory and tables if needed, and switches the
    /// database to write-ahead logging so readers are not blocked by an ingest.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use coderag_index::store::CodeIndex;
    ///
    /// let index = CodeIndex::open(Path::new(".coderag/index.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self, CoderagError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                CoderagError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| CoderagError::Database(format!("failed to open database: {e}")))?;

        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|e| CoderagError::Database(format!("failed to enable WAL: {e}")))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| CoderagError::Database(format!("failed to set synchronous mode: {e}")))?;

        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, CoderagError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CoderagError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let index = Self { conn };
        index.init_schema()?;
        Ok(index)
    }

    fn init_schema(&self) -> Result<(), CoderagError> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS metadata (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS chunks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repo_root TEXT NOT NULL,
                    path TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    language TEXT NOT NULL,
                    content TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    symbol_kind TEXT,
                    symbol_name TEXT,
                    embedding BLOB,
                    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
                );

                CREATE INDEX IF NOT EXISTS idx_chunks_repo_path
                    ON chunks(repo_root, path);
                CREATE INDEX IF NOT EXISTS idx_chunks_repo_path_hash
                    ON chunks(repo_root, path, content_hash);

                CREATE TABLE IF NOT EXISTS symbols (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    repo_root TEXT NOT NULL,
                    symbol_name TEXT NOT NULL,
                    symbol_kind TEXT NOT NULL,
                    path TEXT NOT NULL,
                    start_line INTEGER NOT NULL,
                    end_line INTEGER NOT NULL,
                    chunk_id INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_symbols_repo_name
                    ON symbols(repo_root, symbol_name);
                ",
            )
            .map_err(|e| CoderagError::Database(format!("failed to create schema: {e}")))?;

        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Record the embedding dimension, or check it against the recorded one.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] if `dimensions` conflicts with an
    /// existing index.
    pub fn set_dimensions(&self, dimensions: usize) -> Result<(), CoderagError> {
        check_dimensions(&self.conn, dimensions)
    }

    /// Get the embedding dimension stored in metadata, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn get_dimensions(&self) -> Result<Option<usize>, CoderagError> {
        stored_dimensions(&self.conn)
    }

    /// Bulk-insert chunk rows for a repository, outside any ingest transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on insert failure or embedding
    /// dimension mismatch.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderag_index::chunker::Chunker;
    /// use coderag_index::store::CodeIndex;
    ///
    /// let index = CodeIndex::in_memory().unwrap();
    /// let chunks = Chunker::default().chunk("README.md", "# Demo");
    /// let rows: Vec<_> = chunks.into_iter().map(|c| (c, Some(vec![1.0, 0.0]))).collect();
    /// index.insert_chunks("/repo", &rows).unwrap();
    /// assert_eq!(index.indexed_paths("/repo").unwrap(), vec!["README.md"]);
    /// ```
    pub fn insert_chunks(
        &self,
        repo_root: &str,
        rows: &[(Chunk, Option<Vec<f32>>)],
    ) -> Result<(), CoderagError> {
        insert_rows(&self.conn, repo_root, rows)
    }

    /// Delete every row for `path` in a repository.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on delete failure.
    pub fn delete_path(&self, repo_root: &str, path: &str) -> Result<(), CoderagError> {
        delete_rows(&self.conn, repo_root, path)
    }

    /// Apply one ingest pass atomically: drop removed paths, then rewrite
    /// changed paths together with their new embeddings.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on any failure; nothing is committed.
    pub fn apply(
        &mut self,
        repo_root: &str,
        removed: &[String],
        replacements: &[PathReplacement],
    ) -> Result<(), CoderagError> {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| CoderagError::Database(format!("failed to begin transaction: {e}")))?;

        for path in removed {
            delete_rows(&tx, repo_root, path)?;
        }
        for replacement in replacements {
            delete_rows(&tx, repo_root, &replacement.path)?;
            insert_rows(&tx, repo_root, &replacement.rows)?;
        }

        tx.commit()
            .map_err(|e| CoderagError::Database(format!("failed to commit ingest: {e}")))
    }

    /// Distinct indexed paths for a repository, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn indexed_paths(&self, repo_root: &str) -> Result<Vec<String>, CoderagError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT path FROM chunks WHERE repo_root = ?1 ORDER BY path")
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_root], |row| row.get(0))
            .map_err(|e| CoderagError::Database(format!("failed to query paths: {e}")))?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?);
        }
        Ok(paths)
    }

    /// Stored content hashes for one path.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn hashes_for_path(
        &self,
        repo_root: &str,
        path: &str,
    ) -> Result<HashSet<String>, CoderagError> {
        let mut stmt = self
            .conn
            .prepare("SELECT content_hash FROM chunks WHERE repo_root = ?1 AND path = ?2")
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_root, path], |row| row.get(0))
            .map_err(|e| CoderagError::Database(format!("failed to query hashes: {e}")))?;

        let mut hashes = HashSet::new();
        for row in rows {
            hashes.insert(row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?);
        }
        Ok(hashes)
    }

    /// Stored content hashes for every indexed path of a repository.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn path_hashes(
        &self,
        repo_root: &str,
    ) -> Result<HashMap<String, HashSet<String>>, CoderagError> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, content_hash FROM chunks WHERE repo_root = ?1")
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_root], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| CoderagError::Database(format!("failed to query hashes: {e}")))?;

        let mut by_path: HashMap<String, HashSet<String>> = HashMap::new();
        for row in rows {
            let (path, hash) =
                row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?;
            by_path.entry(path).or_default().insert(hash);
        }
        Ok(by_path)
    }

    /// Every chunk of a repository, ordered by path then position.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn chunks(&self, repo_root: &str) -> Result<Vec<StoredChunk>, CoderagError> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE repo_root = ?1 \
             ORDER BY path, start_line, end_line, id"
        );
        self.query_chunks(&sql, params![repo_root])
    }

    /// Every chunk of a repository that carries an embedding, with the vector.
    ///
    /// The dimension of each vector is inferred from its byte length.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn embedded_chunks(
        &self,
        repo_root: &str,
    ) -> Result<Vec<(StoredChunk, Vec<f32>)>, CoderagError> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, embedding FROM chunks \
             WHERE repo_root = ?1 AND embedding IS NOT NULL ORDER BY id"
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_root], |row| {
                Ok((stored_chunk_from_row(row)?, row.get::<_, Vec<u8>>(9)?))
            })
            .map_err(|e| CoderagError::Database(format!("failed to query chunks: {e}")))?;

        let mut out = Vec::new();
        for row in rows {
            let (chunk, bytes) =
                row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?;
            let vector = embedding::from_bytes(&bytes, embedding::dimension_of(&bytes))?;
            out.push((chunk, vector));
        }
        Ok(out)
    }

    /// Rows for the given identifiers, in the order given. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn chunks_by_ids(&self, ids: &[i64]) -> Result<Vec<StoredChunk>, CoderagError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id IN ({placeholders})");
        let found = self.query_chunks(&sql, params_from_iter(ids.iter()))?;

        let mut by_id: HashMap<i64, StoredChunk> = found.into_iter().map(|c| (c.id, c)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Chunk identifiers stored for one path, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn chunk_ids_for_path(&self, repo_root: &str, path: &str) -> Result<Vec<i64>, CoderagError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM chunks WHERE repo_root = ?1 AND path = ?2 ORDER BY id")
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params![repo_root, path], |row| row.get(0))
            .map_err(|e| CoderagError::Database(format!("failed to query chunk ids: {e}")))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?);
        }
        Ok(ids)
    }

    /// Get index statistics for a repository.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Database`] on query failure.
    pub fn stats(&self, repo_root: &str) -> Result<IndexStats, CoderagError> {
        let count = |sql: &str| -> Result<usize, CoderagError> {
            let n: i64 = self
                .conn
                .query_row(sql, params![repo_root], |row| row.get(0))
                .map_err(|e| CoderagError::Database(format!("failed to compute stats: {e}")))?;
            Ok(n as usize)
        };

        let total_chunks = count("SELECT COUNT(*) FROM chunks WHERE repo_root = ?1")?;
        let total_files = count("SELECT COUNT(DISTINCT path) FROM chunks WHERE repo_root = ?1")?;
        let embedded_chunks =
            count("SELECT COUNT(*) FROM chunks WHERE repo_root = ?1 AND embedding IS NOT NULL")?;
        let total_symbols = count("SELECT COUNT(*) FROM symbols WHERE repo_root = ?1")?;

        // For in-memory databases, page_count returns a small number
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(IndexStats {
            total_chunks,
            total_files,
            embedded_chunks,
            total_symbols,
            embedding_dimensions: self.get_dimensions()?,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }

    fn query_chunks<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<StoredChunk>, CoderagError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| CoderagError::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params, stored_chunk_from_row)
            .map_err(|e| CoderagError::Database(format!("failed to query chunks: {e}")))?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row.map_err(|e| CoderagError::Database(format!("failed to read row: {e}")))?);
        }
        Ok(chunks)
    }
}

fn stored_chunk_from_row(row: &Row<'_>) -> rusqlite::Result<StoredChunk> {
    let symbol_kind: Option<String> = row.get(7)?;
    Ok(StoredChunk {
        id: row.get(0)?,
        chunk: Chunk {
            path: row.get(1)?,
            start_line: row.get(2)?,
            end_line: row.get(3)?,
            language: row.get(4)?,
            content: row.get(5)?,
            content_hash: row.get(6)?,
            symbol_kind: symbol_kind.and_then(|k| k.parse::<SymbolKind>().ok()),
            symbol_name: row.get(8)?,
        },
    })
}

fn insert_rows(
    conn: &Connection,
    repo_root: &str,
    rows: &[(Chunk, Option<Vec<f32>>)],
) -> Result<(), CoderagError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT INTO chunks
             (repo_root, path, start_line, end_line, language, content, content_hash,
              symbol_kind, symbol_name, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .map_err(|e| CoderagError::Database(format!("failed to prepare insert: {e}")))?;

    for (chunk, vector) in rows {
        if let Some(v) = vector {
            check_dimensions(conn, v.len())?;
        }
        stmt.execute(params![
            repo_root,
            chunk.path,
            chunk.start_line,
            chunk.end_line,
            chunk.language,
            chunk.content,
            chunk.content_hash,
            chunk.symbol_kind.map(SymbolKind::as_str),
            chunk.symbol_name,
            vector.as_deref().map(embedding::to_bytes),
        ])
        .map_err(|e| CoderagError::Database(format!("failed to insert chunk: {e}")))?;
    }
    Ok(())
}

fn delete_rows(conn: &Connection, repo_root: &str, path: &str) -> Result<(), CoderagError> {
    conn.execute(
        "DELETE FROM chunks WHERE repo_root = ?1 AND path = ?2",
        params![repo_root, path],
    )
    .map_err(|e| CoderagError::Database(format!("failed to delete chunks for {path}: {e}")))?;
    Ok(())
}

fn check_dimensions(conn: &Connection, dimensions: usize) -> Result<(), CoderagError> {
    match stored_dimensions(conn)? {
        Some(stored) if stored != dimensions => Err(CoderagError::Database(format!(
            "Index was created with {stored} dimensions but the embedding model produced {dimensions}. \
             Delete the index and re-ingest to rebuild."
        ))),
        Some(_) => Ok(()),
        None => set_metadata(conn, DIMENSIONS_KEY, &dimensions.to_string()),
    }
}

fn stored_dimensions(conn: &Connection) -> Result<Option<usize>, CoderagError> {
    match get_metadata(conn, DIMENSIONS_KEY)? {
        Some(v) => {
            let dims: usize = v.parse().map_err(|_| {
                CoderagError::Database(format!("Corrupted dimension metadata in index: '{v}'"))
            })?;
            Ok(Some(dims))
        }
        None => Ok(None),
    }
}

fn get_metadata(conn: &Connection, key: &str) -> Result<Option<String>, CoderagError> {
    let result = conn.query_row(
        "SELECT value FROM metadata WHERE key = ?1",
        params![key],
        |row| row.get(0),
    );

    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(CoderagError::Database(format!(
            "failed to get metadata '{key}': {e}"
        ))),
    }
}

fn set_metadata(conn: &Connection, key: &str, value: &str) -> Result<(), CoderagError> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        params![key, value],
    )
    .map_err(|e| CoderagError::Database(format!("failed to set metadata '{key}': {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::content_hash;

    const REPO: &str = "/repo";

    fn sample_chunk(path: &str, start: u32, content: &str) -> Chunk {
        Chunk {
            path: path.into(),
            start_line: start,
            end_line: start + 4,
            language: "python".into(),
            content: content.into(),
            content_hash: content_hash(content),
            symbol_kind: Some(SymbolKind::Function),
            symbol_name: Some("main".into()),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let index = CodeIndex::in_memory().unwrap();
        let chunk = sample_chunk("src/main.py", 1, "def main(): pass");
        index
            .insert_chunks(REPO, &[(chunk.clone(), Some(vec![0.6, 0.8]))])
            .unwrap();

        let stored = index.chunks(REPO).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].chunk, chunk);

        let embedded = index.embedded_chunks(REPO).unwrap();
        assert_eq!(embedded[0].1, vec![0.6, 0.8]);
    }

    #[test]
    fn rows_are_scoped_by_repo_root() {
        let index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(REPO, &[(sample_chunk("a.py", 1, "a"), None)])
            .unwrap();
        index
            .insert_chunks("/other", &[(sample_chunk("b.py", 1, "b"), None)])
            .unwrap();

        assert_eq!(index.indexed_paths(REPO).unwrap(), vec!["a.py"]);
        assert_eq!(index.indexed_paths("/other").unwrap(), vec!["b.py"]);
        assert_eq!(index.stats(REPO).unwrap().total_chunks, 1);
    }

    #[test]
    fn chunks_without_embedding_are_not_vector_candidates() {
        let index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(
                REPO,
                &[
                    (sample_chunk("a.py", 1, "a"), None),
                    (sample_chunk("a.py", 10, "b"), Some(vec![1.0])),
                ],
            )
            .unwrap();
        assert_eq!(index.embedded_chunks(REPO).unwrap().len(), 1);
        let stats = index.stats(REPO).unwrap();
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.embedded_chunks, 1);
    }

    #[test]
    fn delete_path_removes_only_that_path() {
        let index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(
                REPO,
                &[
                    (sample_chunk("a.py", 1, "a"), None),
                    (sample_chunk("b.py", 1, "b"), None),
                ],
            )
            .unwrap();
        index.delete_path(REPO, "a.py").unwrap();
        assert_eq!(index.indexed_paths(REPO).unwrap(), vec!["b.py"]);
    }

    #[test]
    fn hashes_are_grouped_by_path() {
        let index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(
                REPO,
                &[
                    (sample_chunk("a.py", 1, "one"), None),
                    (sample_chunk("a.py", 6, "two"), None),
                    (sample_chunk("b.py", 1, "three"), None),
                ],
            )
            .unwrap();

        let by_path = index.path_hashes(REPO).unwrap();
        assert_eq!(by_path["a.py"].len(), 2);
        assert!(by_path["b.py"].contains(&content_hash("three")));
        assert_eq!(index.hashes_for_path(REPO, "a.py").unwrap(), by_path["a.py"]);
    }

    #[test]
    fn chunks_by_ids_preserves_requested_order() {
        let index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(
                REPO,
                &[
                    (sample_chunk("a.py", 1, "a"), None),
                    (sample_chunk("b.py", 1, "b"), None),
                ],
            )
            .unwrap();
        let a = index.chunk_ids_for_path(REPO, "a.py").unwrap()[0];
        let b = index.chunk_ids_for_path(REPO, "b.py").unwrap()[0];

        let rows = index.chunks_by_ids(&[b, 9999, a]).unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert!(index.chunks_by_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn apply_replaces_and_removes_in_one_pass() {
        let mut index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(
                REPO,
                &[
                    (sample_chunk("gone.py", 1, "old"), None),
                    (sample_chunk("edit.py", 1, "before"), None),
                ],
            )
            .unwrap();

        let replacement = PathReplacement {
            path: "edit.py".into(),
            rows: vec![(sample_chunk("edit.py", 1, "after"), Some(vec![1.0, 0.0]))],
        };
        index
            .apply(REPO, &["gone.py".to_string()], &[replacement])
            .unwrap();

        assert_eq!(index.indexed_paths(REPO).unwrap(), vec!["edit.py"]);
        let hashes = index.hashes_for_path(REPO, "edit.py").unwrap();
        assert!(hashes.contains(&content_hash("after")));
        assert!(!hashes.contains(&content_hash("before")));
    }

    #[test]
    fn failed_apply_commits_nothing() {
        let mut index = CodeIndex::in_memory().unwrap();
        index
            .insert_chunks(REPO, &[(sample_chunk("a.py", 1, "keep"), Some(vec![1.0, 0.0]))])
            .unwrap();

        // second replacement carries a vector of the wrong dimension
        let replacements = vec![
            PathReplacement {
                path: "a.py".into(),
                rows: vec![(sample_chunk("a.py", 1, "new"), Some(vec![0.0, 1.0]))],
            },
            PathReplacement {
                path: "b.py".into(),
                rows: vec![(sample_chunk("b.py", 1, "bad"), Some(vec![1.0, 0.0, 0.0]))],
            },
        ];
        assert!(index.apply(REPO, &[], &replacements).is_err());

        let hashes = index.hashes_for_path(REPO, "a.py").unwrap();
        assert!(hashes.contains(&content_hash("keep")));
        assert_eq!(index.indexed_paths(REPO).unwrap(), vec!["a.py"]);
    }

    #[test]
    fn set_dimensions_stores_and_validates() {
        let index = CodeIndex::in_memory().unwrap();

        index.set_dimensions(1024).unwrap();
        assert_eq!(index.get_dimensions().unwrap(), Some(1024));

        // Same dimensions is a no-op
        index.set_dimensions(1024).unwrap();

        let err = index.set_dimensions(768).unwrap_err().to_string();
        assert!(err.contains("1024"));
        assert!(err.contains("768"));
        assert!(err.contains("re-ingest"));
    }

    #[test]
    fn get_dimensions_returns_none_for_new_index() {
        let index = CodeIndex::in_memory().unwrap();
        assert_eq!(index.get_dimensions().unwrap(), None);
    }

    #[test]
    fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested/index.db");
        let index = CodeIndex::open(&db).unwrap();
        assert!(db.exists());
        assert_eq!(index.stats(REPO).unwrap().total_files, 0);
    }

    #[test]
    fn empty_database_returns_no_rows() {
        let index = CodeIndex::in_memory().unwrap();
        assert!(index.chunks(REPO).unwrap().is_empty());
        assert!(index.embedded_chunks(REPO).unwrap().is_empty());
        assert!(index.path_hashes(REPO).unwrap().is_empty());
    }
}
