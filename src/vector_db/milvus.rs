use super::{SearchResult, VectorStore};
use crate::parser::Chunk;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Max length of the VarChar primary key; sub-chunk ids are an md5 hex
/// digest plus a short suffix.
const ID_MAX_LENGTH: usize = 64;

/// Milvus vector database client (using REST API v2)
pub struct MilvusVectorDatabase {
    client: Client,
    address: String,
    collection: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCollectionRequest<'a> {
    collection_name: &'a str,
    dimension: usize,
    metric_type: &'a str,
    id_type: &'a str,
    primary_field_name: &'a str,
    vector_field_name: &'a str,
    params: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    collection_name: &'a str,
    data: Vec<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    collection_name: &'a str,
    filter: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    data: Vec<&'a [f32]>,
    anns_field: &'a str,
    limit: usize,
    output_fields: Vec<&'a str>,
}

/// Envelope of every v2 response; failures come back as HTTP 200 with a
/// non-zero `code`.
#[derive(Debug, Deserialize)]
struct MilvusResponse<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

impl MilvusVectorDatabase {
    pub fn new(address: &str, collection: &str, dimension: usize) -> Self {
        Self {
            client: Client::new(),
            address: address.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimension,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.address, path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        operation: &str,
    ) -> Result<Option<T>> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send Milvus {} request", operation))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Milvus {} error ({}): {}", operation, status, body);
        }

        let envelope: MilvusResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to decode Milvus {} response", operation))?;

        if envelope.code != 0 {
            anyhow::bail!(
                "Milvus {} error (code {}): {}",
                operation,
                envelope.code,
                envelope.message.unwrap_or_default()
            );
        }

        Ok(envelope.data)
    }

    async fn has_collection(&self) -> Result<bool> {
        let has: Option<HasCollection> = self
            .post(
                "collections/has",
                &json!({ "collectionName": self.collection }),
                "has collection",
            )
            .await?;
        Ok(has.is_some_and(|h| h.has))
    }

    async fn create_collection(&self) -> Result<()> {
        let request = CreateCollectionRequest {
            collection_name: &self.collection,
            dimension: self.dimension,
            metric_type: "COSINE",
            id_type: "VarChar",
            primary_field_name: "id",
            vector_field_name: "vector",
            params: json!({ "max_length": ID_MAX_LENGTH }),
        };
        let _: Option<Value> = self
            .post("collections/create", &request, "create collection")
            .await?;
        Ok(())
    }
}

/// One Milvus row per chunk; metadata lives in dynamic fields.
fn row(chunk: &Chunk, vector: &[f32]) -> Value {
    let meta = &chunk.metadata;
    json!({
        "id": chunk.id,
        "vector": vector,
        "content": chunk.content,
        "absolute_path": meta.absolute_path.to_string_lossy(),
        "relative_path": meta.relative_path,
        "scope_name": meta.scope_name,
        "container_name": meta.container_name,
        "member_name": meta.member_name,
        "kind": meta.kind.as_str(),
        "language": meta.language,
        "start_line": meta.start_line,
        "end_line": meta.end_line,
        "content_hash": meta.content_hash,
    })
}

/// Boolean filter matching every row of one file.
fn path_filter(relative_path: &str) -> String {
    let escaped = relative_path.replace('\\', "\\\\").replace('"', "\\\"");
    format!("relative_path == \"{}\"", escaped)
}

fn search_result(mut hit: serde_json::Map<String, Value>) -> SearchResult {
    let id = match hit.remove("id") {
        Some(Value::String(id)) => id,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let score = hit
        .remove("distance")
        .and_then(|d| d.as_f64())
        .unwrap_or(0.0) as f32;

    SearchResult {
        id,
        score,
        metadata: Value::Object(hit),
    }
}

#[async_trait::async_trait]
impl VectorStore for MilvusVectorDatabase {
    async fn connect(&self) -> Result<()> {
        if !self.health_check().await {
            anyhow::bail!("Milvus is not reachable at {}", self.address);
        }

        if !self.has_collection().await? {
            tracing::info!("Creating collection {} (dimension {})", self.collection, self.dimension);
            self.create_collection().await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> bool {
        let result: Result<Option<Value>> = self
            .post("collections/list", &json!({}), "list collections")
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Milvus health check failed: {:#}", e);
                false
            }
        }
    }

    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != vectors.len() {
            anyhow::bail!(
                "Milvus upsert given {} rows but {} vectors",
                chunks.len(),
                vectors.len()
            );
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest {
            collection_name: &self.collection,
            data: chunks
                .iter()
                .zip(vectors.iter())
                .map(|(chunk, vector)| row(chunk, vector))
                .collect(),
        };

        let _: Option<Value> = self.post("entities/upsert", &request, "upsert").await?;
        Ok(())
    }

    async fn delete_file(&self, relative_path: &str) -> Result<()> {
        let request = DeleteRequest {
            collection_name: &self.collection,
            filter: path_filter(relative_path),
        };
        let _: Option<Value> = self.post("entities/delete", &request, "delete").await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            collection_name: &self.collection,
            data: vec![vector],
            anns_field: "vector",
            limit,
            output_fields: vec!["*"],
        };

        let hits: Option<Vec<serde_json::Map<String, Value>>> =
            self.post("entities/search", &request, "search").await?;

        Ok(hits.unwrap_or_default().into_iter().map(search_result).collect())
    }
}
