//! Core types, configuration, and error handling for coderag.
//!
//! This crate provides the shared foundation used by the other coderag crates:
//! - [`CoderagError`] - unified error type using `thiserror`
//! - [`CoderagConfig`] - configuration loaded from `.coderag.toml`
//! - Shared types: [`SymbolKind`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    ChunkingConfig, CoderagConfig, EmbeddingConfig, IndexConfig, LlmConfig, RetrievalConfig,
};
pub use error::CoderagError;
pub use types::{OutputFormat, SymbolKind};

/// A convenience `Result` type for coderag operations.
pub type Result<T> = std::result::Result<T, CoderagError>;
