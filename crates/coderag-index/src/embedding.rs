//! Embedding adapter: the one place an external numeric model is consulted.
//!
//! [`Embedder`] is the seam; [`EmbeddingClient`] implements it against any
//! OpenAI-compatible `/embeddings` endpoint. Vectors are L2-normalized here so
//! the rest of the crate can treat a dot product as cosine similarity.

use std::future::Future;

use coderag_core::{CoderagError, EmbeddingConfig};
use serde::{Deserialize, Serialize};

/// Turns texts into fixed-dimension unit-norm vectors, one per input, in order.
///
/// Handles are created once and passed into ingest and query operations, so
/// tests substitute a deterministic fake.
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Embedding`] when the model is unavailable.
    fn embed(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, CoderagError>> + Send;
}

/// Embed a single question.
///
/// # Errors
///
/// Returns [`CoderagError::Embedding`] if the embedder fails or returns nothing.
pub async fn embed_query<E: Embedder>(embedder: &E, question: &str) -> Result<Vec<f32>, CoderagError> {
    embedder
        .embed(&[question.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CoderagError::Embedding("embedder returned no vector for query".into()))
}

/// HTTP client for OpenAI-compatible embedding endpoints (OpenAI, Voyage, Ollama).
///
/// # Examples
///
/// ```
/// use coderag_core::EmbeddingConfig;
/// use coderag_index::embedding::EmbeddingClient;
///
/// let config = EmbeddingConfig {
///     provider: "ollama".into(),
///     model: "nomic-embed-text".into(),
///     ..EmbeddingConfig::default()
/// };
/// let client = EmbeddingClient::with_config(&config).unwrap();
/// assert_eq!(client.model(), "nomic-embed-text");
/// ```
pub struct EmbeddingClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    batch_size: usize,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

const BATCH_DELAY_MS: u64 = 200;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedDataItem>,
}

#[derive(Deserialize)]
struct EmbedDataItem {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl EmbeddingClient {
    /// Create a client from an [`EmbeddingConfig`].
    ///
    /// Falls back to the provider's environment variable if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Config`] if the provider needs a key and none is available.
    pub fn with_config(config: &EmbeddingConfig) -> Result<Self, CoderagError> {
        let api_key = match config.api_key_env() {
            None => config.api_key.clone(),
            Some(var) => Some(
                config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var(var).ok())
                    .ok_or_else(|| {
                        CoderagError::Config(format!(
                            "embedding API key not found: set embedding.api_key in .coderag.toml or {var} env var"
                        ))
                    })?,
            ),
        };

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config.resolved_base_url(),
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, CoderagError> {
        let request = EmbedRequest {
            model: &self.model,
            input: batch,
        };

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CoderagError::Embedding(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(CoderagError::Embedding(format!(
                "embedding API returned {status}: {body}"
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| CoderagError::Embedding(format!("failed to parse response: {e}")))?;

        let vectors = order_by_index(embed_response);
        if vectors.len() != batch.len() {
            return Err(CoderagError::Embedding(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

impl Embedder for EmbeddingClient {
    /// Splits into sub-batches of `batch_size` with 200ms between requests.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoderagError> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(tokio::time::Duration::from_millis(BATCH_DELAY_MS)).await;
            }
            tracing::debug!(batch = i, size = batch.len(), "requesting embeddings");
            let vectors = self.embed_batch(batch).await?;
            all_embeddings.extend(vectors.into_iter().map(normalize));
        }

        Ok(all_embeddings)
    }
}

fn order_by_index(response: EmbedResponse) -> Vec<Vec<f32>> {
    let mut data = response.data;
    data.sort_by_key(|item| item.index);
    data.into_iter().map(|item| item.embedding).collect()
}

/// Scale a vector to unit length. The zero vector is returned unchanged.
///
/// # Examples
///
/// ```
/// use coderag_index::embedding::normalize;
///
/// let v = normalize(vec![3.0, 4.0]);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((v[1] - 0.8).abs() < 1e-6);
/// ```
pub fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Dot product of two same-dimension vectors; cosine similarity for unit vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Serialize a vector as little-endian 4-byte floats.
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for f in vector {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

/// Dimension implied by a serialized vector's length.
pub fn dimension_of(bytes: &[u8]) -> usize {
    bytes.len() / 4
}

/// Deserialize a vector, checking it has `dim` components.
///
/// # Errors
///
/// Returns [`CoderagError::Parse`] if the byte length is not `dim * 4`.
///
/// # Examples
///
/// ```
/// use coderag_index::embedding::{from_bytes, to_bytes};
///
/// let v = vec![0.25_f32, -1.5, 3.0];
/// assert_eq!(from_bytes(&to_bytes(&v), 3).unwrap(), v);
/// assert!(from_bytes(&to_bytes(&v), 4).is_err());
/// ```
pub fn from_bytes(bytes: &[u8], dim: usize) -> Result<Vec<f32>, CoderagError> {
    if bytes.len() != dim * 4 {
        return Err(CoderagError::Parse(format!(
            "embedding has {} bytes, expected {} for dimension {dim}",
            bytes.len(),
            dim * 4
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_format_is_correct() {
        let texts = vec!["fn main() {}".to_string(), "struct Foo {}".to_string()];
        let request = EmbedRequest {
            model: "text-embedding-3-small",
            input: &texts,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "text-embedding-3-small");
        assert_eq!(json["input"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn response_is_ordered_by_index() {
        let json = r#"{
            "data": [
                {"embedding": [0.4, 0.5], "index": 1},
                {"embedding": [0.1, 0.2], "index": 0}
            ]
        }"#;
        let response: EmbedResponse = serde_json::from_str(json).unwrap();
        let vectors = order_by_index(response);
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.4, 0.5]]);
    }

    #[test]
    fn missing_api_key_gives_clear_error() {
        std::env::remove_var("VOYAGE_API_KEY");
        let config = EmbeddingConfig {
            provider: "voyage".into(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = EmbeddingClient::with_config(&config).unwrap_err().to_string();
        assert!(err.contains("VOYAGE_API_KEY"), "error should name the env var: {err}");
    }

    #[test]
    fn ollama_needs_no_key() {
        let config = EmbeddingConfig {
            provider: "ollama".into(),
            ..EmbeddingConfig::default()
        };
        let client = EmbeddingClient::with_config(&config).unwrap();
        assert!(client.api_key.is_none());
        assert_eq!(client.base_url, "http://localhost:11434/v1");
    }

    #[test]
    fn normalize_yields_unit_length() {
        let v = normalize(vec![1.0, 2.0, 2.0]);
        let norm: f64 = dot(&v, &v);
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn serialized_length_is_four_bytes_per_dimension() {
        let bytes = to_bytes(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(bytes.len(), 16);
        assert_eq!(dimension_of(&bytes), 4);
    }

    #[tokio::test]
    async fn embed_query_takes_first_vector() {
        struct Fixed;
        impl Embedder for Fixed {
            async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoderagError> {
                Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
            }
        }
        assert_eq!(embed_query(&Fixed, "abc").await.unwrap(), vec![3.0]);
    }
}
