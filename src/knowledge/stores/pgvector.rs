// PostgreSQL + pgvector backend. The only component that talks to Postgres;
// the rest of the persistence layer stays on the primary pool.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{ChunkRecord, VectorSearchResult, VectorStore};
use crate::error::{DeskError, Result};

#[derive(Debug, Clone)]
pub struct PgVectorStore {
    pool: PgPool,
}

fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 8 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&v.to_string());
    }
    out.push(']');
    out
}

impl PgVectorStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        if !database_url.starts_with("postgres") {
            return Err(DeskError::Configuration(
                "pgvector backend requires a postgres database url".into(),
            ));
        }
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&pool)
            .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS vector_chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                content TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                embedding vector,
                metadata JSONB NOT NULL DEFAULT '{}'
            )",
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn store(&self, doc_id: &str, chunks: Vec<ChunkRecord>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM vector_chunks WHERE document_id = $1")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;
        for chunk in &chunks {
            let chunk_index = chunk
                .metadata
                .get("chunk_index")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0) as i32;
            sqlx::query(
                "INSERT INTO vector_chunks (id, document_id, content, chunk_index, embedding, metadata)
                 VALUES ($1, $2, $3, $4, $5::vector, $6::jsonb)",
            )
            .bind(&chunk.chunk_id)
            .bind(doc_id)
            .bind(&chunk.content)
            .bind(chunk_index)
            .bind(vector_literal(&chunk.embedding))
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
        // Cosine distance operator; similarity = 1 - distance.
        let literal = vector_literal(embedding);
        let rows = match tag_filter.filter(|f| !f.is_empty()) {
            Some(filter) => {
                sqlx::query(
                    "SELECT id, document_id, content, chunk_index, metadata,
                            1 - (embedding <=> $1::vector) AS score
                     FROM vector_chunks
                     WHERE metadata->'tags' ?| $3
                     ORDER BY embedding <=> $1::vector
                     LIMIT $2",
                )
                .bind(&literal)
                .bind(top_k as i64)
                .bind(filter)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, document_id, content, chunk_index, metadata,
                            1 - (embedding <=> $1::vector) AS score
                     FROM vector_chunks
                     ORDER BY embedding <=> $1::vector
                     LIMIT $2",
                )
                .bind(&literal)
                .bind(top_k as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .filter_map(|row| {
                let score: f64 = row.get("score");
                if score <= 0.0 {
                    return None;
                }
                Some(VectorSearchResult {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    content: row.get("content"),
                    chunk_index: row.get::<i32, _>("chunk_index") as usize,
                    score: score as f32,
                    metadata: row.get::<serde_json::Value, _>("metadata"),
                })
            })
            .collect())
    }

    async fn delete(&self, doc_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM vector_chunks WHERE document_id = $1")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
