use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoderagError;

/// Top-level configuration loaded from `.coderag.toml`.
///
/// Every section and field has a default, so an empty file is valid.
///
/// # Examples
///
/// ```
/// use coderag_core::CoderagConfig;
///
/// let config = CoderagConfig::default();
/// assert_eq!(config.chunking.max_lines, 120);
/// assert_eq!(config.retrieval.candidates, 30);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoderagConfig {
    /// Index location and candidate-file filtering.
    #[serde(default)]
    pub index: IndexConfig,
    /// Chunker parameters.
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Retrieval defaults.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Generative model settings for answer synthesis.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl CoderagConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Io`] if the file cannot be read, or
    /// [`CoderagError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use coderag_core::CoderagConfig;
    /// use std::path::Path;
    ///
    /// let config = CoderagConfig::from_file(Path::new(".coderag.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CoderagError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderag_core::CoderagConfig;
    ///
    /// let toml = r#"
    /// [chunking]
    /// max_lines = 80
    /// "#;
    /// let config = CoderagConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.chunking.max_lines, 80);
    /// assert_eq!(config.chunking.overlap, 20);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CoderagError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// Where the index lives and which files are candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database path (default: `.coderag/index.db`).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Extra gitignore-style patterns applied on top of the built-in ignore set.
    #[serde(default)]
    pub extra_ignores: Vec<String>,
    /// Files larger than this are not indexed (default: 1 MiB).
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".coderag/index.db")
}

fn default_max_file_bytes() -> u64 {
    1_048_576
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            extra_ignores: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Chunker parameters.
///
/// # Examples
///
/// ```
/// use coderag_core::ChunkingConfig;
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.small_file_lines, 250);
/// assert_eq!(config.header_lines, 60);
/// assert_eq!(config.min_node_lines, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in lines (default: 120).
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Lines shared between consecutive windows (default: 20).
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// Files up to this many lines become a single window (default: 250).
    #[serde(default = "default_small_file_lines")]
    pub small_file_lines: usize,
    /// Lines captured by the structural header chunk (default: 60).
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
    /// Declarations shorter than this are discarded (default: 3).
    #[serde(default = "default_min_node_lines")]
    pub min_node_lines: usize,
}

fn default_max_lines() -> usize {
    120
}

fn default_overlap() -> usize {
    20
}

fn default_small_file_lines() -> usize {
    250
}

fn default_header_lines() -> usize {
    60
}

fn default_min_node_lines() -> usize {
    3
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            overlap: default_overlap(),
            small_file_lines: default_small_file_lines(),
            header_lines: default_header_lines(),
            min_node_lines: default_min_node_lines(),
        }
    }
}

/// Retrieval defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hits returned per query (default: 6).
    #[serde(default = "default_k")]
    pub k: usize,
    /// Vector-recall candidate count for hybrid search (default: 30).
    #[serde(default = "default_candidates")]
    pub candidates: usize,
    /// Cap for definition lookups (default: 10).
    #[serde(default = "default_definitions_limit")]
    pub definitions_limit: usize,
    /// Cap for reference scans (default: 20).
    #[serde(default = "default_references_limit")]
    pub references_limit: usize,
}

fn default_k() -> usize {
    6
}

fn default_candidates() -> usize {
    30
}

fn default_definitions_limit() -> usize {
    10
}

fn default_references_limit() -> usize {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            candidates: default_candidates(),
            definitions_limit: default_definitions_limit(),
            references_limit: default_references_limit(),
        }
    }
}

/// Configuration for the embedding provider.
///
/// # Examples
///
/// ```
/// use coderag_core::EmbeddingConfig;
///
/// let config = EmbeddingConfig::default();
/// assert_eq!(config.provider, "openai");
/// assert_eq!(config.model, "text-embedding-3-small");
/// assert_eq!(config.batch_size, 64);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: `"openai"`, `"voyage"`, or `"ollama"` (default: `"openai"`).
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    /// API key for the embedding provider.
    pub api_key: Option<String>,
    /// Model name (default: `"text-embedding-3-small"`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Custom base URL for the embeddings endpoint.
    pub base_url: Option<String>,
    /// Texts per request (default: 64).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_provider() -> String {
    "openai".into()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

fn default_batch_size() -> usize {
    64
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            model: default_embedding_model(),
            base_url: None,
            batch_size: default_batch_size(),
        }
    }
}

impl EmbeddingConfig {
    /// Environment variable consulted when no key is configured.
    ///
    /// Returns `None` for providers that run without credentials.
    ///
    /// # Examples
    ///
    /// ```
    /// use coderag_core::EmbeddingConfig;
    ///
    /// let mut config = EmbeddingConfig::default();
    /// assert_eq!(config.api_key_env(), Some("OPENAI_API_KEY"));
    /// config.provider = "ollama".into();
    /// assert_eq!(config.api_key_env(), None);
    /// ```
    pub fn api_key_env(&self) -> Option<&'static str> {
        provider_key_env(&self.provider)
    }

    /// Base URL for the configured provider.
    pub fn resolved_base_url(&self) -> String {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/').to_string();
        }
        match self.provider.as_str() {
            "voyage" => "https://api.voyageai.com/v1".into(),
            "ollama" => "http://localhost:11434/v1".into(),
            _ => "https://api.openai.com/v1".into(),
        }
    }
}

/// Generative model configuration.
///
/// # Examples
///
/// ```
/// use coderag_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert!((config.temperature - 0.1).abs() < f32::EPSILON);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Sampling temperature (default: 0.1).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(&self) -> Option<&'static str> {
        provider_key_env(&self.provider)
    }
}

fn provider_key_env(provider: &str) -> Option<&'static str> {
    match provider {
        "ollama" => None,
        "voyage" => Some("VOYAGE_API_KEY"),
        _ => Some("OPENAI_API_KEY"),
    }
}
