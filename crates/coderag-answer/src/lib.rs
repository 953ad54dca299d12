//! Grounded answer synthesis for coderag.
//!
//! Builds a prompt from hybrid retrieval hits, sends it to an OpenAI-compatible
//! chat model, and parses the chunk citations out of the reply.

pub mod answer;
pub mod llm;
pub mod prompt;
