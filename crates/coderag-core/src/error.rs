use std::path::PathBuf;

/// Errors that can occur while indexing, retrieving, or answering.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary converts to `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use coderag_core::CoderagError;
///
/// let err = CoderagError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CoderagError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration, including missing credentials.
    #[error("configuration error: {0}")]
    #[diagnostic(help("run `coderag init` to create a .coderag.toml, or set the provider's API key env var"))]
    Config(String),

    /// Source code parsing failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Index database failure.
    #[error("database error: {0}")]
    Database(String),

    /// Embedding model unavailable or returned an unusable response.
    #[error("embedding error: {0}")]
    #[diagnostic(help("check [embedding] in .coderag.toml and that the provider is reachable"))]
    Embedding(String),

    /// Generative model API or response error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: CoderagError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = CoderagError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn embedding_error_is_prefixed() {
        let err = CoderagError::Embedding("model not loaded".into());
        assert_eq!(err.to_string(), "embedding error: model not loaded");
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = CoderagError::FileNotFound(PathBuf::from("/tmp/missing.db"));
        assert!(err.to_string().contains("/tmp/missing.db"));
    }
}
