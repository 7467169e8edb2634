// Pinecone backend over its HTTP API. Chunk content travels in vector
// metadata so search results need no second lookup.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChunkRecord, VectorSearchResult, VectorStore};
use crate::error::{DeskError, Result};

#[derive(Debug)]
pub struct PineconeStore {
    client: Client,
    api_key: String,
    index_host: String,
}

impl PineconeStore {
    /// `index_host` is the index's data-plane host, e.g.
    /// `https://flydesk-abc123.svc.us-east-1.pinecone.io`.
    pub fn new(api_key: impl Into<String>, index_host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            index_host: index_host.into(),
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/{path}", self.index_host))
            .header("Api-Key", &self.api_key)
    }
}

fn store_err(e: reqwest::Error) -> DeskError {
    DeskError::VectorStore(format!("pinecone request failed: {e}"))
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let vectors: Vec<Value> = chunks
            .iter()
            .map(|chunk| {
                let mut meta = json!({
                    "document_id": doc_id,
                    "content": chunk.content,
                    "chunk_index": chunk.metadata.get("chunk_index").cloned().unwrap_or(json!(0)),
                });
                let tags = super::metadata_tags(&chunk.metadata);
                if !tags.is_empty() {
                    meta["tags"] = json!(tags);
                }
                json!({
                    "id": chunk.chunk_id,
                    "values": chunk.embedding,
                    "metadata": meta,
                })
            })
            .collect();

        self.request("vectors/upsert")
            .json(&json!({"vectors": vectors}))
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
        let mut body = json!({
            "vector": embedding,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = tag_filter.filter(|f| !f.is_empty()) {
            body["filter"] = json!({"tags": {"$in": filter}});
        }

        let response: Value = self
            .request("query")
            .json(&body)
            .send()
            .await
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;

        let mut results = Vec::new();
        for matched in response["matches"].as_array().unwrap_or(&Vec::new()) {
            let score = matched["score"].as_f64().unwrap_or(0.0) as f32;
            if score <= 0.0 {
                continue;
            }
            let meta = matched["metadata"].clone();
            results.push(VectorSearchResult {
                chunk_id: matched["id"].as_str().unwrap_or_default().to_string(),
                document_id: meta["document_id"].as_str().unwrap_or_default().to_string(),
                content: meta["content"].as_str().unwrap_or_default().to_string(),
                chunk_index: meta["chunk_index"].as_u64().unwrap_or(0) as usize,
                score,
                metadata: meta,
            });
        }
        Ok(results)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        self.request("vectors/delete")
            .json(&json!({"filter": {"document_id": doc_id}}))
            .send()
            .await
            .map_err(store_err)?
            .error_for_status()
            .map_err(store_err)?;
        Ok(())
    }
}
