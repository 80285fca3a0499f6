use super::{Embedding, EmbeddingProvider};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// OpenAI embedding provider
pub struct OpenAIEmbedding {
    client: Client,
    api_key: String,
    model: String,
    dimension: usize,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAIEmbedding {
    pub fn new(api_key: &str, model: &str, batch_size: usize) -> Self {
        let dimension = match model {
            "text-embedding-3-large" => 3072,
            _ => 1536,
        };

        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            dimension,
            batch_size: batch_size.max(1),
        }
    }

    /// One request, retried with exponential backoff while the API answers 429.
    async fn request(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let request = OpenAIEmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        let response = loop {
            let response = self
                .client
                .post(OPENAI_EMBEDDINGS_URL)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&request)
                .send()
                .await
                .context("Failed to send embedding request to OpenAI")?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                attempt += 1;
                tracing::warn!(
                    "OpenAI rate limited, retry {}/{} in {:?}",
                    attempt,
                    MAX_RETRIES,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                continue;
            }
            break response;
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI embedding API error ({}): {}", status, body);
        }

        let embedding_response: OpenAIEmbeddingResponse = response
            .json()
            .await
            .context("Failed to decode OpenAI embedding response")?;

        // Sort by index to maintain order
        let mut sorted_data = embedding_response.data;
        sorted_data.sort_by_key(|d| d.index);

        Ok(sorted_data
            .into_iter()
            .map(|d| Embedding {
                values: d.embedding,
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAIEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let embeddings = self.embed_batch(&[text]).await?;
        embeddings
            .into_iter()
            .next()
            .context("No embedding returned")
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.request(batch).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_by_model() {
        assert_eq!(OpenAIEmbedding::new("k", "text-embedding-3-large", 8).dimension(), 3072);
        assert_eq!(OpenAIEmbedding::new("k", "text-embedding-3-small", 8).dimension(), 1536);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        assert_eq!(OpenAIEmbedding::new("k", "text-embedding-3-small", 0).batch_size, 1);
    }
}
