//! Test doubles for the external collaborators.

use crate::embedding::{Embedding, EmbeddingProvider};
use crate::ingest::report::{OutcomeRecord, OutcomeSink};
use crate::parser::code_parser::{CodeParser, ParsedSource, SourceParser};
use crate::parser::Chunk;
use crate::vector_db::{SearchResult, VectorStore};
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// Deterministic three-dimensional embeddings, optionally failing every call.
#[derive(Default)]
pub struct MockEmbedding {
    pub fail_with: Option<String>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{}", message);
        }
        Ok(Embedding {
            values: vec![text.len() as f32, 0.0, 1.0],
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        3
    }
}

/// In-memory store keeping rows by id plus the order they arrived in.
#[derive(Default)]
pub struct MockStore {
    pub unreachable: bool,
    pub rows: Mutex<HashMap<String, Chunk>>,
    pub upserted: Mutex<Vec<Chunk>>,
    pub deleted_paths: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn upserted_for(&self, relative_path: &str) -> Vec<Chunk> {
        self.upserted
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.metadata.relative_path == relative_path)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl VectorStore for MockStore {
    async fn connect(&self) -> Result<()> {
        if self.unreachable {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        !self.unreachable
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        assert_eq!(chunks.len(), vectors.len());
        let mut rows = self.rows.lock().unwrap();
        for chunk in chunks {
            rows.insert(chunk.id.clone(), chunk.clone());
        }
        self.upserted.lock().unwrap().extend(chunks.iter().cloned());
        Ok(())
    }

    async fn delete_file(&self, relative_path: &str) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .retain(|_, c| c.metadata.relative_path != relative_path);
        self.deleted_paths.lock().unwrap().push(relative_path.to_string());
        Ok(())
    }

    async fn query(&self, _vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .values()
            .take(limit)
            .map(|c| SearchResult {
                id: c.id.clone(),
                score: 1.0,
                metadata: serde_json::json!({ "relative_path": c.metadata.relative_path }),
            })
            .collect())
    }
}

/// Tree-sitter parser that blows up on one file name.
pub struct FailingParser {
    pub inner: CodeParser,
    pub fail_on: String,
}

impl FailingParser {
    pub fn new(fail_on: &str) -> Self {
        Self {
            inner: CodeParser::new(),
            fail_on: fail_on.to_string(),
        }
    }
}

impl SourceParser for FailingParser {
    fn parse(&self, path: &Path, source: Option<String>) -> Result<ParsedSource> {
        if path.file_name().is_some_and(|n| n == self.fail_on.as_str()) {
            anyhow::bail!("parser crashed on input");
        }
        self.inner.parse(path, source)
    }

    fn extensions(&self) -> Vec<String> {
        self.inner.extensions()
    }
}

/// Sink that keeps every record for later assertions.
#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<OutcomeRecord>>,
}

impl OutcomeSink for RecordingSink {
    fn record(&self, record: &OutcomeRecord) {
        self.records.lock().unwrap().push(record.clone());
    }
}
