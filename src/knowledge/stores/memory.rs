// In-memory vector store for tests and single-node dev deployments.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{cosine_similarity, passes_tag_filter, ChunkRecord, VectorSearchResult, VectorStore};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    chunks: DashMap<String, Vec<ChunkRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        self.chunks.insert(doc_id.to_string(), chunks);
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<VectorSearchResult>> {
        let mut scored: Vec<VectorSearchResult> = Vec::new();
        for entry in self.chunks.iter() {
            for chunk in entry.value() {
                if !passes_tag_filter(&chunk.metadata, tag_filter) {
                    continue;
                }
                let score = cosine_similarity(embedding, &chunk.embedding);
                if score <= 0.0 {
                    continue;
                }
                scored.push(VectorSearchResult {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: entry.key().clone(),
                    content: chunk.content.clone(),
                    chunk_index: chunk
                        .metadata
                        .get("chunk_index")
                        .and_then(serde_json::Value::as_u64)
                        .unwrap_or(0) as usize,
                    score,
                    metadata: chunk.metadata.clone(),
                });
            }
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        self.chunks.remove(doc_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, embedding: Vec<f32>, tags: &[&str]) -> ChunkRecord {
        ChunkRecord {
            chunk_id: id.to_string(),
            content: format!("content {id}"),
            embedding,
            metadata: json!({"chunk_index": 0, "tags": tags}),
        }
    }

    #[tokio::test]
    async fn search_orders_by_score_and_caps_k() {
        let store = MemoryVectorStore::new();
        store
            .store(
                "doc1",
                vec![
                    record("close", vec![1.0, 0.0], &[]),
                    record("closer", vec![0.9, 0.1], &[]),
                    record("far", vec![0.0, 1.0], &[]),
                ],
            )
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.05], 2, None).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score >= results[1].score);
        for result in &results {
            assert!(result.score > 0.0 && result.score <= 1.0);
        }
    }

    #[tokio::test]
    async fn negative_scores_are_omitted() {
        let store = MemoryVectorStore::new();
        store
            .store("doc1", vec![record("opposite", vec![-1.0, 0.0], &[])])
            .await
            .unwrap();
        let results = store.search(&[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn tag_filter_restricts_results() {
        let store = MemoryVectorStore::new();
        store
            .store(
                "doc1",
                vec![
                    record("hr", vec![1.0, 0.0], &["hr"]),
                    record("sales", vec![1.0, 0.0], &["sales"]),
                ],
            )
            .await
            .unwrap();

        let filter = vec!["hr".to_string()];
        let results = store.search(&[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "hr");
    }

    #[tokio::test]
    async fn delete_removes_document_chunks() {
        let store = MemoryVectorStore::new();
        store
            .store("doc1", vec![record("a", vec![1.0, 0.0], &[])])
            .await
            .unwrap();
        store.delete("doc1").await.unwrap();
        assert!(store.search(&[1.0, 0.0], 5, None).await.unwrap().is_empty());
    }
}
