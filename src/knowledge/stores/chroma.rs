// ChromaDB backend over its HTTP API. One collection holds all chunks;
// document tags are flattened to a comma-separated string because Chroma
// metadata values must be scalar.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChunkRecord, VectorSearchResult, VectorStore};
use crate::error::{DeskError, Result};

const COLLECTION: &str = "flydesk_knowledge";

#[derive(Debug)]
pub struct ChromaDbStore {
    client: Client,
    base_url: String,
}

impl ChromaDbStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn collection_id(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/v1/collections", self.base_url))
            .json(&json!({
                "name": COLLECTION,
                "get_or_create": true,
                "metadata": {"hnsw:space": "cosine"},
            }))
            .send()
            .await
            .map_err(store_err)?;
        let body: Value = response.json().await.map_err(store_err)?;
        body.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| DeskError::VectorStore("chroma collection has no id".into()))
    }

    fn tag_clause(tag_filter: Option<&[String]>) -> Option<Value> {
        let filter = tag_filter.filter(|f| !f.is_empty())?;
        if filter.len() == 1 {
            Some(json!({"tags": {"$contains": filter[0]}}))
        } else {
            let clauses: Vec<Value> = filter
                .iter()
                .map(|tag| json!({"tags": {"$contains": tag}}))
                .collect();
            Some(json!({"$or": clauses}))
        }
    }
}

fn store_err(e: reqwest::Error) -> DeskError {
    DeskError::VectorStore(format!("chroma request failed: {e}"))
}

#[async_trait]
impl VectorStore for ChromaDbStore {
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let collection = self.collection_id().await?;

        let mut ids = Vec::new();
        let mut documents = Vec::new();
        let mut embeddings = Vec::new();
        let mut metadatas = Vec::new();
        for chunk in &chunks {
            ids.push(chunk.chunk_id.clone());
            documents.push(chunk.content.clone());
            embeddings.push(chunk.embedding.clone());
            let mut meta = json!({
                "document_id": doc_id,
                "chunk_index": chunk.metadata.get("chunk_index").cloned().unwrap_or(json!(0)),
            });
            let tags = super::metadata_tags(&chunk.metadata);
            if !tags.is_empty() {
                meta["tags"] = json!(tags.join(","));
            }
            metadatas.push(meta);
        }

        self.client
            .post(format!(
                "{}/api/v1/collections/{collection}/upsert",
                self.base_url
            ))
            .json(&json!({
                "ids": ids,
                "documents": documents,
                "embeddings": embeddings,
                "metadatas": metadatas,
            }))
            .send()
            .await
            .map_err(store_err)?
            .error_for_status()
            .map_err(store_err)?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<VectorSearchResult>> {
        let collection = self.collection_id().await?;
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = Self::tag_clause(tag_filter) {
            body["where"] = clause;
        }

        let response: Value = self
            .client
            .post(format!(
                "{}/api/v1/collections/{collection}/query",
                self.base_url
            ))
            .json(&body)
            .send()
            .await
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;

        let empty = Vec::new();
        let ids = response["ids"][0].as_array().unwrap_or(&empty);
        let documents = response["documents"][0].as_array().unwrap_or(&empty);
        let metadatas = response["metadatas"][0].as_array().unwrap_or(&empty);
        let distances = response["distances"][0].as_array().unwrap_or(&empty);

        let mut results = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            // Chroma cosine distance: 0 identical, 2 opposite.
            let distance = distances.get(i).and_then(Value::as_f64).unwrap_or(0.0);
            let score = (1.0 - distance) as f32;
            if score <= 0.0 {
                continue;
            }
            let meta = metadatas.get(i).cloned().unwrap_or(Value::Null);
            results.push(VectorSearchResult {
                chunk_id: id.as_str().unwrap_or_default().to_string(),
                document_id: meta["document_id"].as_str().unwrap_or_default().to_string(),
                content: documents
                    .get(i)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                chunk_index: meta["chunk_index"].as_u64().unwrap_or(0) as usize,
                score,
                metadata: meta,
            });
        }
        Ok(results)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        let collection = self.collection_id().await?;
        self.client
            .post(format!(
                "{}/api/v1/collections/{collection}/delete",
                self.base_url
            ))
            .json(&json!({"where": {"document_id": doc_id}}))
            .send()
            .await
            .map_err(store_err)?
            .error_for_status()
            .map_err(store_err)?;
        Ok(())
    }
}
