pub mod milvus;

use crate::parser::Chunk;
use anyhow::Result;

/// Vector store sink. Chunks are upserted keyed by their id, so
/// re-ingesting unchanged content overwrites rather than duplicates.
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Verify reachability and make sure the target collection exists.
    async fn connect(&self) -> Result<()>;
    async fn health_check(&self) -> bool;
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;
    /// Drop every stored chunk of one file.
    async fn delete_file(&self, relative_path: &str) -> Result<()>;
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>>;
}

/// Search result from vector database
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}
