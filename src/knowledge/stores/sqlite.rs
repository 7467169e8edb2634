// SQLite-backed vector store. Embeddings are JSON-encoded in the chunks
// table and similarity is computed in-process, which is fine at dev scale.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{cosine_similarity, passes_tag_filter, ChunkRecord, VectorSearchResult, VectorStore};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        for chunk in &chunks {
            let chunk_index = chunk
                .metadata
                .get("chunk_index")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as i64;
            sqlx::query(
                "INSERT INTO document_chunks (id, document_id, content, chunk_index, embedding, metadata)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.chunk_id)
            .bind(doc_id)
            .bind(&chunk.content)
            .bind(chunk_index)
            .bind(serde_json::to_string(&chunk.embedding)?)
            .bind(chunk.metadata.to_string())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        tag_filter: Option<&[String]>,
    ) -> Result<Vec<VectorSearchResult>> {
        let rows = sqlx::query(
            "SELECT id, document_id, content, chunk_index, embedding, metadata FROM document_chunks",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::new();
        for row in &rows {
            let Some(raw_embedding) = row.get::<Option<String>, _>("embedding") else {
                continue;
            };
            let Ok(chunk_embedding) = serde_json::from_str::<Vec<f32>>(&raw_embedding) else {
                continue;
            };
            let metadata: String = row.get("metadata");
            let metadata = serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null);
            if !passes_tag_filter(&metadata, tag_filter) {
                continue;
            }
            let score = cosine_similarity(embedding, &chunk_embedding);
            if score <= 0.0 {
                continue;
            }
            scored.push(VectorSearchResult {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                content: row.get("content"),
                chunk_index: row.get::<i64, _>("chunk_index") as usize,
                score,
                metadata,
            });
        }
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
