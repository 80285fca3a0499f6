pub mod ollama;
pub mod openai;

use anyhow::Result;

/// Embedding vector result
#[derive(Debug, Clone)]
pub struct Embedding {
    pub values: Vec<f32>,
}

/// Embedding provider trait. Implementations own batching and retry; the
/// ingestion core only classifies whatever error comes back.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding>;
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>>;
    fn dimension(&self) -> usize;
}

/// Rough token count used for the hard ceiling: one token per four bytes.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}
