//! Incremental ingest: walk, chunk, diff against the store, embed what
//! changed, write in one transaction, then rebuild the symbol table.

use std::collections::HashSet;
use std::path::Path;

use coderag_core::{CoderagConfig, CoderagError};
use serde::{Deserialize, Serialize};

use crate::chunker::{Chunk, Chunker};
use crate::diff::{self, PathStatus};
use crate::embedding::Embedder;
use crate::store::{CodeIndex, PathReplacement};
use crate::symbols;
use crate::walker::{self, CandidateFile};

/// Outcome of one ingest pass.
///
/// # Examples
///
/// ```
/// use coderag_index::ingest::IngestReport;
///
/// let report = IngestReport::default();
/// assert!(report.is_noop());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Canonical repository root the rows are scoped to.
    pub repo_root: String,
    /// Candidate files found under the root.
    pub files_seen: usize,
    /// Paths added or rewritten.
    pub changed: usize,
    /// Paths whose hash set was unchanged.
    pub skipped: usize,
    /// Previously indexed paths no longer present.
    pub removed: usize,
    /// Chunks sent to the embedder.
    pub chunks_embedded: usize,
    /// Symbol entries after the rebuild.
    pub symbols: usize,
}

impl IngestReport {
    /// Whether the pass wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.changed == 0 && self.removed == 0
    }
}

struct PendingPath {
    path: String,
    chunks: Vec<Chunk>,
}

/// Bring the index for `root` in line with the filesystem.
///
/// Only added or changed paths are chunk-embedded. Unreadable files are
/// skipped with a warning and keep whatever rows they already had.
///
/// # Errors
///
/// Returns [`CoderagError::FileNotFound`] if `root` does not exist,
/// [`CoderagError::Embedding`] if the embedder fails (nothing is written), or
/// [`CoderagError::Database`] if the write fails (nothing is committed).
pub async fn ingest<E: Embedder>(
    index: &mut CodeIndex,
    embedder: &E,
    root: &Path,
    config: &CoderagConfig,
) -> Result<IngestReport, CoderagError> {
    let root = walker::canonical_root(root)?;
    let repo_root = root.to_string_lossy().into_owned();
    let files = walker::discover(&root, &config.index)?;
    let stored = index.path_hashes(&repo_root)?;
    let chunker = Chunker::new(config.chunking.clone());

    let mut report = IngestReport {
        repo_root: repo_root.clone(),
        files_seen: files.len(),
        ..IngestReport::default()
    };

    let mut seen = HashSet::with_capacity(files.len());
    let mut pending = Vec::new();

    for CandidateFile { absolute, relative } in files {
        seen.insert(relative.clone());

        let text = match walker::read_text(&absolute) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %relative, "skipping unreadable file: {e}");
                continue;
            }
        };

        let chunks = chunker.chunk(&relative, &text);
        let status = diff::classify(stored.get(&relative), &diff::hash_set(&chunks));
        tracing::debug!(path = %relative, ?status, chunks = chunks.len(), "classified");

        if status == PathStatus::Unchanged {
            report.skipped += 1;
        } else {
            pending.push(PendingPath {
                path: relative,
                chunks,
            });
        }
    }

    let removed = diff::removed_paths(&stored, &seen);
    report.changed = pending.len();
    report.removed = removed.len();

    let replacements = embed_pending(embedder, pending, &mut report).await?;

    if !report.is_noop() {
        index.apply(&repo_root, &removed, &replacements)?;
    }
    report.symbols = symbols::rebuild(index, &repo_root)?;

    tracing::info!(
        repo_root = %report.repo_root,
        files = report.files_seen,
        changed = report.changed,
        skipped = report.skipped,
        removed = report.removed,
        embedded = report.chunks_embedded,
        "ingest complete"
    );
    Ok(report)
}

/// One embedder call for every non-blank chunk of every pending path.
async fn embed_pending<E: Embedder>(
    embedder: &E,
    pending: Vec<PendingPath>,
    report: &mut IngestReport,
) -> Result<Vec<PathReplacement>, CoderagError> {
    let texts: Vec<String> = pending
        .iter()
        .flat_map(|p| &p.chunks)
        .filter(|c| !c.content.trim().is_empty())
        .map(|c| c.content.clone())
        .collect();

    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedder.embed(&texts).await?
    };
    if vectors.len() != texts.len() {
        return Err(CoderagError::Embedding(format!(
            "embedder returned {} vectors for {} chunks",
            vectors.len(),
            texts.len()
        )));
    }
    report.chunks_embedded = vectors.len();

    let mut vectors = vectors.into_iter();
    let replacements = pending
        .into_iter()
        .map(|p| PathReplacement {
            path: p.path,
            rows: p
                .chunks
                .into_iter()
                .map(|c| {
                    let vector = if c.content.trim().is_empty() {
                        None
                    } else {
                        vectors.next()
                    };
                    (c, vector)
                })
                .collect(),
        })
        .collect();
    Ok(replacements)
}
