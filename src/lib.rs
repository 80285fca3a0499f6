//! Incremental, AST-aware ingestion of source trees into a vector store.
//!
//! Files are discovered, gated by a fingerprint cache, parsed with
//! tree-sitter, cut into content-addressed chunks at semantic-unit
//! boundaries, embedded and upserted. Failures stay scoped to their file.

pub mod config;
pub mod discovery;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod parser;
pub mod snapshot;
pub mod vector_db;

#[cfg(test)]
pub(crate) mod testing;
