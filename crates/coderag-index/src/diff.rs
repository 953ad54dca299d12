//! Content-hash comparison between a path's fresh chunks and what is stored.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::chunker::Chunk;

/// How a path compares against the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Not indexed before.
    Added,
    /// Indexed, but the hash set differs.
    Changed,
    /// Indexed with an identical hash set.
    Unchanged,
}

impl PathStatus {
    /// Whether the path must be re-embedded and rewritten.
    pub fn needs_write(self) -> bool {
        !matches!(self, PathStatus::Unchanged)
    }
}

/// Set of content hashes for a path's chunks.
pub fn hash_set(chunks: &[Chunk]) -> HashSet<String> {
    chunks.iter().map(|c| c.content_hash.clone()).collect()
}

/// Classify a path given its stored hashes (if indexed) and its fresh hashes.
///
/// Comparison is set equality; chunk order and duplicate hashes do not matter.
///
/// # Examples
///
/// ```
/// use std::collections::HashSet;
/// use coderag_index::diff::{classify, PathStatus};
///
/// let old: HashSet<String> = ["a".to_string(), "b".to_string()].into();
/// let same: HashSet<String> = ["b".to_string(), "a".to_string()].into();
/// let new: HashSet<String> = ["a".to_string(), "c".to_string()].into();
///
/// assert_eq!(classify(None, &new), PathStatus::Added);
/// assert_eq!(classify(Some(&old), &same), PathStatus::Unchanged);
/// assert_eq!(classify(Some(&old), &new), PathStatus::Changed);
/// ```
pub fn classify(stored: Option<&HashSet<String>>, fresh: &HashSet<String>) -> PathStatus {
    match stored {
        None => PathStatus::Added,
        Some(old) if old == fresh => PathStatus::Unchanged,
        Some(_) => PathStatus::Changed,
    }
}

/// Indexed paths absent from the current tree, sorted.
pub fn removed_paths(
    stored: &HashMap<String, HashSet<String>>,
    seen: &HashSet<String>,
) -> Vec<String> {
    stored
        .keys()
        .filter(|path| !seen.contains(*path))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
