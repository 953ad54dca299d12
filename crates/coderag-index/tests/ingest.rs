use std::fs;
use std::path::Path;

use coderag_core::{CoderagConfig, CoderagError};
use coderag_index::embedding::{normalize, Embedder};
use coderag_index::ingest::{ingest, IngestReport};
use coderag_index::search::{search_hybrid, search_lexical, search_vector, SearchSource};
use coderag_index::store::CodeIndex;
use coderag_index::symbols::{find_definitions, find_references};

const DIM: usize = 64;

/// Hashed bag-of-words, unit-normalized.
struct BagOfWords;

impl Embedder for BagOfWords {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoderagError> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for word in text
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .bytes()
            .fold(0xcbf29ce484222325_u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100000001b3));
        v[(bucket % DIM as u64) as usize] += 1.0;
    }
    normalize(v)
}

const TOKENS_PY: &str = "\
import hmac
import os

SECRET = os.environ.get(\"SECRET\", \"\")


def validate_token(token):
    if not token:
        return False
    return hmac.compare_digest(token, SECRET)
";

fn write_toy_repo(root: &Path) {
    fs::create_dir_all(root.join("auth")).unwrap();
    fs::create_dir_all(root.join("web")).unwrap();
    fs::write(root.join("auth/tokens.py"), TOKENS_PY).unwrap();

    let js = (1..=300)
        .map(|i| format!("console.log(\"step {i}\");"))
        .collect::<Vec<_>>()
        .join("\n");
    fs::write(root.join("web/app.js"), js).unwrap();
}

async fn run(index: &mut CodeIndex, root: &Path) -> IngestReport {
    ingest(index, &BagOfWords, root, &CoderagConfig::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn toy_repository_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    let mut index = CodeIndex::in_memory().unwrap();

    let report = run(&mut index, dir.path()).await;
    assert_eq!(report.files_seen, 2);
    assert_eq!(report.changed, 2);

    let chunks = index.chunks(&report.repo_root).unwrap();
    let python: Vec<_> = chunks.iter().filter(|c| c.chunk.path == "auth/tokens.py").collect();
    let js: Vec<_> = chunks.iter().filter(|c| c.chunk.path == "web/app.js").collect();
    assert!(python.len() >= 2, "python chunks: {python:?}");
    assert!(js.len() > 1);
    for pair in js.windows(2) {
        assert!(pair[1].chunk.start_line <= pair[0].chunk.end_line, "windows overlap");
    }
    assert_eq!(js.last().unwrap().chunk.end_line, 300);

    let hits = search_lexical(&index, &report.repo_root, "validate_token", 6).unwrap();
    assert_eq!(hits[0].path, "auth/tokens.py");
    assert!(hits.iter().all(|h| h.path == "auth/tokens.py"));
    // header and declaration both score 7; the header was inserted first
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].score, hits[1].score);
    assert_eq!((hits[0].start_line, hits[0].end_line), (1, 10));
    assert_eq!((hits[1].start_line, hits[1].end_line), (7, 10));
    assert!(hits[0].chunk_id < hits[1].chunk_id);

    let defs = find_definitions(&index, &report.repo_root, "validate_token", 10).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!((defs[0].start_line, defs[0].end_line), (7, 10));
}

#[tokio::test]
async fn second_ingest_of_unchanged_tree_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    let mut index = CodeIndex::in_memory().unwrap();

    let first = run(&mut index, dir.path()).await;
    let rows_before = index.stats(&first.repo_root).unwrap().total_chunks;

    let second = run(&mut index, dir.path()).await;
    assert_eq!(second.changed, 0);
    assert_eq!(second.removed, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.chunks_embedded, 0);
    assert_eq!(index.stats(&first.repo_root).unwrap().total_chunks, rows_before);
}

#[tokio::test]
async fn editing_one_file_leaves_other_chunk_ids_alone() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    fs::write(dir.path().join("README.md"), "# Toy\n\nA toy repository.").unwrap();
    let mut index = CodeIndex::in_memory().unwrap();

    let first = run(&mut index, dir.path()).await;
    let repo = first.repo_root.clone();
    let js_ids = index.chunk_ids_for_path(&repo, "web/app.js").unwrap();
    let py_ids = index.chunk_ids_for_path(&repo, "auth/tokens.py").unwrap();

    fs::write(dir.path().join("README.md"), "# Toy\n\nNow with more words.").unwrap();
    let second = run(&mut index, dir.path()).await;

    assert_eq!(second.changed, 1);
    assert_eq!(second.skipped, 2);
    assert_eq!(index.chunk_ids_for_path(&repo, "web/app.js").unwrap(), js_ids);
    assert_eq!(index.chunk_ids_for_path(&repo, "auth/tokens.py").unwrap(), py_ids);
}

#[tokio::test]
async fn deleted_file_loses_chunks_and_symbols() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    let mut index = CodeIndex::in_memory().unwrap();
    let first = run(&mut index, dir.path()).await;
    assert_eq!(index.stats(&first.repo_root).unwrap().total_symbols, 1);

    fs::remove_file(dir.path().join("auth/tokens.py")).unwrap();
    let second = run(&mut index, dir.path()).await;

    assert_eq!(second.removed, 1);
    assert_eq!(index.indexed_paths(&first.repo_root).unwrap(), vec!["web/app.js"]);
    assert!(find_definitions(&index, &first.repo_root, "validate_token", 10)
        .unwrap()
        .is_empty());
    assert_eq!(index.stats(&first.repo_root).unwrap().total_symbols, 0);
}

#[tokio::test]
async fn ignored_paths_are_never_indexed() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    fs::create_dir_all(dir.path().join("node_modules/lib")).unwrap();
    fs::write(dir.path().join("node_modules/lib/index.js"), "module.exports = 1;").unwrap();
    fs::write(dir.path().join(".gitignore"), "web/\n").unwrap();

    let mut index = CodeIndex::in_memory().unwrap();
    let report = run(&mut index, dir.path()).await;
    assert_eq!(
        index.indexed_paths(&report.repo_root).unwrap(),
        vec![".gitignore", "auth/tokens.py"]
    );
}

#[tokio::test]
async fn vector_and_hybrid_search_find_the_function() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    let mut index = CodeIndex::in_memory().unwrap();
    let report = run(&mut index, dir.path()).await;

    let vector = search_vector(&index, &BagOfWords, &report.repo_root, "hmac compare_digest token", 3)
        .await
        .unwrap();
    assert_eq!(vector[0].path, "auth/tokens.py");
    assert_eq!(vector[0].source, SearchSource::Vector);

    let hybrid = search_hybrid(&index, &BagOfWords, &report.repo_root, "validate token", 2, 30)
        .await
        .unwrap();
    assert_eq!(hybrid.len(), 2);
    assert!(hybrid.iter().all(|h| h.path == "auth/tokens.py"));
    assert!(hybrid[0].why.as_deref().unwrap().contains("token"));
}

#[tokio::test]
async fn references_come_from_other_files() {
    let dir = tempfile::tempdir().unwrap();
    write_toy_repo(dir.path());
    fs::write(
        dir.path().join("auth/middleware.py"),
        "from auth.tokens import validate_token\n\nok = validate_token(request.token)\n",
    )
    .unwrap();
    let mut index = CodeIndex::in_memory().unwrap();
    let report = run(&mut index, dir.path()).await;

    let refs = find_references(&index, &report.repo_root, "validate_token", 20).unwrap();
    let lines: Vec<(&str, u32)> = refs.iter().map(|r| (r.path.as_str(), r.line)).collect();
    assert_eq!(lines, vec![("auth/middleware.py", 1), ("auth/middleware.py", 3)]);
}

#[tokio::test]
async fn on_disk_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let repo = dir.path().join("repo");
    fs::create_dir_all(&repo).unwrap();
    write_toy_repo(&repo);
    let db = dir.path().join("state/index.db");

    {
        let mut index = CodeIndex::open(&db).unwrap();
        run(&mut index, &repo).await;
    }

    let mut index = CodeIndex::open(&db).unwrap();
    let report = run(&mut index, &repo).await;
    assert!(report.is_noop());
    assert_eq!(index.get_dimensions().unwrap(), Some(DIM));
}
