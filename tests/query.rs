use std::path::Path;
use std::process::{Command, Output};

use coderag_index::chunker::Chunker;
use coderag_index::store::CodeIndex;
use coderag_index::symbols;
use coderag_index::walker::repo_key;

/// Seed `.coderag/index.db` under `dir` without calling an embedding provider.
fn seed(dir: &Path) {
    let repo = repo_key(dir).unwrap();
    let mut index = CodeIndex::open(&dir.join(".coderag/index.db")).unwrap();
    let chunker = Chunker::default();
    let source = "\
def validate_token(token):
    if not token:
        return False
    return token.startswith(\"tk_\")
";
    let mut rows = Vec::new();
    for chunk in chunker.chunk("auth/tokens.py", source) {
        rows.push((chunk, None));
    }
    for chunk in chunker.chunk("auth/middleware.py", "from tokens import validate_token\n\nok = validate_token(header)\n") {
        rows.push((chunk, None));
    }
    index.insert_chunks(&repo, &rows).unwrap();
    symbols::rebuild(&mut index, &repo).unwrap();
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_coderag"))
        .args(args)
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

#[test]
fn ask_ranks_lexical_hits_as_json() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let output = run(dir.path(), &["ask", "validate token", "--format", "json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0]["path"], "auth/tokens.py");
}

#[test]
fn defs_finds_function_definition() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let output = run(dir.path(), &["defs", "validate_token"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("function validate_token auth/tokens.py:1-4"), "got: {stdout}");
}

#[test]
fn refs_skip_definition_lines() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let output = run(dir.path(), &["refs", "validate_token"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("auth/middleware.py:3:"));
    assert!(!stdout.contains("def validate_token"));
}

#[test]
fn stats_reports_unembedded_chunks() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path());

    let output = run(dir.path(), &["stats", "--format", "json"]);
    assert!(output.status.success());

    let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats["totalFiles"], 2);
    assert_eq!(stats["embeddedChunks"], 0);
}

#[test]
fn queries_without_index_fail_with_hint() {
    let dir = tempfile::tempdir().unwrap();

    let output = run(dir.path(), &["ask", "anything", "--path", "."]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No index found at"), "got: {stderr}");
    assert!(stderr.contains("coderag ingest --path ."), "got: {stderr}");
    assert!(!stderr.contains("{}"), "unformatted hint: {stderr}");
}

#[test]
fn ingest_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("README.md"), "# demo\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_coderag"))
        .arg("ingest")
        .current_dir(dir.path())
        .env_remove("OPENAI_API_KEY")
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(!dir.path().join(".coderag").exists());
}
