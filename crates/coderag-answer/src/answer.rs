//! Grounded answer synthesis over hybrid retrieval.

use coderag_core::{CoderagError, LlmConfig, RetrievalConfig};
use coderag_index::embedding::Embedder;
use coderag_index::search::{self, SearchHit};
use coderag_index::store::CodeIndex;
use serde::{Deserialize, Serialize};

use crate::llm::Generator;
use crate::prompt::{self, ContextChunk, INSUFFICIENT_CONTEXT};

/// A synthesized answer with the chunks it cites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Model output, trimmed.
    pub text: String,
    /// Cited chunk ids, deduplicated, in first-seen order.
    pub citations: Vec<i64>,
    /// Hybrid hits the prompt was built from.
    pub hits: Vec<SearchHit>,
}

impl Answer {
    /// Cited ids that were not part of the retrieved context.
    pub fn unsupported_citations(&self) -> Vec<i64> {
        self.citations
            .iter()
            .copied()
            .filter(|id| !self.hits.iter().any(|h| h.chunk_id == *id))
            .collect()
    }
}

/// Answer `question` from the repository's hybrid hits.
///
/// When retrieval finds nothing the model is not called and the answer is
/// `INSUFFICIENT_CONTEXT`.
///
/// # Errors
///
/// Returns [`CoderagError::Embedding`] if the question cannot be embedded,
/// [`CoderagError::Llm`] if generation fails, or [`CoderagError::Database`]
/// on store failures.
pub async fn synthesize<E: Embedder, G: Generator>(
    index: &CodeIndex,
    embedder: &E,
    generator: &G,
    repo_root: &str,
    question: &str,
    retrieval: &RetrievalConfig,
    llm: &LlmConfig,
) -> Result<Answer, CoderagError> {
    let hits = search::search_hybrid(
        index,
        embedder,
        repo_root,
        question,
        retrieval.k,
        retrieval.candidates,
    )
    .await?;

    if hits.is_empty() {
        tracing::info!("no context retrieved, skipping generation");
        return Ok(Answer {
            text: INSUFFICIENT_CONTEXT.to_string(),
            citations: Vec::new(),
            hits,
        });
    }

    let ids: Vec<i64> = hits.iter().map(|h| h.chunk_id).collect();
    let contexts: Vec<ContextChunk> = index
        .chunks_by_ids(&ids)?
        .into_iter()
        .map(ContextChunk::from)
        .collect();

    let prompt = prompt::build_prompt(question, &contexts);
    let text = generator
        .generate(&prompt, &llm.model, llm.temperature)
        .await?;
    let citations = prompt::parse_citations(&text);

    tracing::info!(hits = hits.len(), citations = citations.len(), "answer generated");
    Ok(Answer {
        text,
        citations,
        hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use coderag_index::chunker::Chunker;

    const REPO: &str = "/repo";

    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoderagError> {
            Ok(texts
                .iter()
                .map(|t| if t.contains("token") { vec![1.0, 0.0] } else { vec![0.0, 1.0] })
                .collect())
        }
    }

    struct Recording {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    impl Generator for Recording {
        async fn generate(
            &self,
            prompt: &str,
            _model: &str,
            _temperature: f32,
        ) -> Result<String, CoderagError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn recording(reply: &str) -> Recording {
        Recording {
            prompts: Mutex::new(Vec::new()),
            reply: reply.into(),
        }
    }

    fn seeded_index() -> CodeIndex {
        let index = CodeIndex::in_memory().unwrap();
        let chunker = Chunker::default();
        let mut rows = Vec::new();
        for (path, text) in [
            ("auth.md", "Tokens are validated by the token service."),
            ("intro.md", "This project has a README."),
        ] {
            for chunk in chunker.chunk(path, text) {
                let v = if chunk.content.contains("token") { vec![1.0, 0.0] } else { vec![0.0, 1.0] };
                rows.push((chunk, Some(v)));
            }
        }
        index.insert_chunks(REPO, &rows).unwrap();
        index
    }

    #[tokio::test]
    async fn prompt_contains_retrieved_context_and_citations_are_parsed() {
        let index = seeded_index();
        let auth_id = index.chunk_ids_for_path(REPO, "auth.md").unwrap()[0];
        let generator = recording(&format!("Answer:\n- via service [chunk:{auth_id}]\n\nCitations:\n- chunk:{auth_id}"));

        let retrieval = RetrievalConfig {
            k: 1,
            ..RetrievalConfig::default()
        };
        let answer = synthesize(
            &index,
            &AxisEmbedder,
            &generator,
            REPO,
            "how is a token validated?",
            &retrieval,
            &LlmConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(answer.citations, vec![auth_id]);
        assert!(answer.unsupported_citations().is_empty());
        assert_eq!(answer.hits.len(), 1);

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(&format!("[chunk_id={auth_id} path=auth.md lines=1-1]")));
        assert!(!prompts[0].contains("intro.md"));
    }

    #[tokio::test]
    async fn empty_index_skips_generation() {
        let index = CodeIndex::in_memory().unwrap();
        let generator = recording("should not be used");

        let answer = synthesize(
            &index,
            &AxisEmbedder,
            &generator,
            REPO,
            "anything",
            &RetrievalConfig::default(),
            &LlmConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(answer.text, INSUFFICIENT_CONTEXT);
        assert!(answer.citations.is_empty());
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn citations_outside_context_are_flagged() {
        let index = seeded_index();
        let generator = recording("Answer:\n- guess [chunk:999]");
        let answer = synthesize(
            &index,
            &AxisEmbedder,
            &generator,
            REPO,
            "token",
            &RetrievalConfig::default(),
            &LlmConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(answer.unsupported_citations(), vec![999]);
    }
}
