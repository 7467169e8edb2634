// Pluggable vector storage backends. Document metadata stays in the
// relational store; these backends hold chunk embeddings and answer k-NN
// queries.

pub mod chroma;
pub mod memory;
pub mod pgvector;
pub mod pinecone;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{DeskConfig, VectorStoreKind};
use crate::error::{DeskError, Result};

/// A chunk ready for storage. `metadata` carries at least `chunk_index` and
/// the parent document's `tags` so stores can filter without a join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

/// A single result from a vector similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct VectorSearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: usize,
    pub score: f32,
    pub metadata: Value,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store all chunks of a document, replacing any previous set.
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()>;

    /// Search for similar chunks. Results are ordered by descending score;
    /// scores at or below zero are omitted. When `tag_filter` is non-empty,
    /// only chunks whose document tags overlap the filter are considered.
    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<VectorSearchResult>>;

    /// Delete all chunks belonging to `doc_id`.
    async fn delete(&self, doc_id: &str) -> Result<()>;
}

/// Cosine similarity. Zero-magnitude vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

pub(crate) fn metadata_tags(metadata: &Value) -> Vec<String> {
    metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn passes_tag_filter(metadata: &Value, tag_filter: Option<&[String]>) -> bool {
    match tag_filter {
        None => true,
        Some(filter) if filter.is_empty() => true,
        Some(filter) => {
            let tags = metadata_tags(metadata);
            tags.iter().any(|t| filter.contains(t))
        }
    }
}

/// Instantiate the configured vector store backend.
pub async fn create_vector_store(
    config: &DeskConfig,
    pool: Option<sqlx::SqlitePool>,
) -> Result<Arc<dyn VectorStore>> {
    match config.vector_store {
        VectorStoreKind::Memory => Ok(Arc::new(memory::MemoryVectorStore::new())),
        VectorStoreKind::Sqlite => {
            let pool = pool.ok_or_else(|| {
                DeskError::Configuration("sqlite vector store requires a database pool".into())
            })?;
            Ok(Arc::new(sqlite::SqliteVectorStore::new(pool)))
        }
        VectorStoreKind::PgVector => {
            let store = pgvector::PgVectorStore::connect(&config.database_url).await?;
            Ok(Arc::new(store))
        }
        VectorStoreKind::ChromaDb => Ok(Arc::new(chroma::ChromaDbStore::new(&config.chroma_url))),
        VectorStoreKind::Pinecone => {
            if config.pinecone_api_key.is_empty() {
                return Err(DeskError::Configuration(
                    "FLYDESK_PINECONE_API_KEY is required for the pinecone backend".into(),
                ));
            }
            Ok(Arc::new(pinecone::PineconeStore::new(
                &config.pinecone_api_key,
                &config.pinecone_index,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_bounds() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn tag_filter_matches_any_overlap() {
        let metadata = serde_json::json!({"tags": ["hr", "policy"]});
        assert!(passes_tag_filter(&metadata, None));
        assert!(passes_tag_filter(&metadata, Some(&[])));
        assert!(passes_tag_filter(&metadata, Some(&["policy".to_string()])));
        assert!(!passes_tag_filter(&metadata, Some(&["sales".to_string()])));
    }
}
