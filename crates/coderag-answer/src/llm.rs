use std::future::Future;
use std::time::Duration;

use coderag_core::{CoderagError, LlmConfig};

/// The external generative model: prompt in, text out.
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Llm`] if the model call fails.
    fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> impl Future<Output = Result<String, CoderagError>> + Send;
}

/// OpenAI-compatible chat completions client.
///
/// Works with any provider that exposes the `/v1/chat/completions` endpoint:
/// OpenAI, Ollama, vLLM, LiteLLM, etc.
///
/// # Examples
///
/// ```
/// use coderag_core::LlmConfig;
/// use coderag_answer::llm::LlmClient;
///
/// let config = LlmConfig {
///     api_key: Some("test-key".into()),
///     ..LlmConfig::default()
/// };
/// let client = LlmClient::new(&config).unwrap();
/// assert_eq!(client.model(), "gpt-4o");
/// ```
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("provider", &self.config.provider)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a new LLM client from configuration.
    ///
    /// Falls back to the provider's environment variable if no key is configured.
    ///
    /// # Errors
    ///
    /// Returns [`CoderagError::Config`] if the provider needs a key and none is
    /// available, or [`CoderagError::Llm`] if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, CoderagError> {
        let mut config = config.clone();
        if let Some(var) = config.api_key_env() {
            if config.api_key.is_none() {
                config.api_key = Some(std::env::var(var).map_err(|_| {
                    CoderagError::Config(format!(
                        "LLM API key not found: set llm.api_key in .coderag.toml or {var} env var"
                    ))
                })?);
            }
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| CoderagError::Llm(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Return the model name from the configuration.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        let base_url = match (&self.config.base_url, self.config.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, "ollama") => "http://localhost:11434",
            (None, _) => "https://api.openai.com",
        };
        format!("{base_url}/v1/chat/completions")
    }
}

impl Generator for LlmClient {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        temperature: f32,
    ) -> Result<String, CoderagError> {
        let body = serde_json::json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": temperature,
        });

        let mut request = self.client.post(self.endpoint());
        if let Some(api_key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        tracing::debug!(model, prompt_bytes = prompt.len(), "requesting completion");
        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| CoderagError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(CoderagError::Llm(format!(
                "LLM API error {status}: {body_text}"
            )));
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoderagError::Llm(format!("failed to parse response: {e}")))?;

        extract_content(&response_body)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                CoderagError::Llm(format!("unexpected response structure: {response_body}"))
            })
    }
}

fn extract_content(body: &serde_json::Value) -> Option<&str> {
    body.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_returns_config_model() {
        let config = LlmConfig {
            model: "gpt-4o-mini".into(),
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[test]
    fn ollama_runs_without_key() {
        let config = LlmConfig {
            provider: "ollama".into(),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        std::env::remove_var("OPENAI_API_KEY");
        let err = LlmClient::new(&LlmConfig::default()).unwrap_err();
        assert!(matches!(err, CoderagError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn custom_base_url_is_used() {
        let config = LlmConfig {
            base_url: Some("http://llm.internal:8000/".into()),
            api_key: Some("k".into()),
            ..LlmConfig::default()
        };
        let client = LlmClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://llm.internal:8000/v1/chat/completions");
    }

    #[test]
    fn content_is_extracted_from_first_choice() {
        let body = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Answer:\n- x" } }]
        });
        assert_eq!(extract_content(&body), Some("Answer:\n- x"));
        assert_eq!(extract_content(&serde_json::json!({})), None);
    }
}
