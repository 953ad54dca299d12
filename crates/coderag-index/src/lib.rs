//! Incremental code indexing and hybrid retrieval.
//!
//! A repository is walked ([`walker`]), each file is split into content-hashed
//! chunks ([`chunker`]), compared against what is stored ([`diff`]), and only
//! changed paths are embedded ([`embedding`]) and rewritten ([`store`]) by
//! [`ingest`]. After every ingest the [`symbols`] table is rebuilt. Queries go
//! through the lexical, vector, or hybrid engines in [`search`].

pub mod chunker;
pub mod diff;
pub mod embedding;
pub mod ingest;
pub mod search;
pub mod store;
pub mod symbols;
pub mod walker;
