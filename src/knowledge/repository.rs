// Relational persistence for knowledge documents.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::knowledge::models::{DocumentStatus, DocumentType, KnowledgeDocument};

#[derive(Debug, Clone)]
pub struct KnowledgeRepository {
    pool: SqlitePool,
}

impl KnowledgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, document: &KnowledgeDocument) -> Result<()> {
        sqlx::query(
            "INSERT INTO knowledge_documents
             (id, title, content, document_type, status, source, tags, workspace_ids, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               title = excluded.title, content = excluded.content,
               document_type = excluded.document_type, status = excluded.status,
               source = excluded.source, tags = excluded.tags,
               workspace_ids = excluded.workspace_ids, metadata = excluded.metadata,
               updated_at = excluded.updated_at",
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.content)
        .bind(document.document_type.as_str())
        .bind(document.status.as_str())
        .bind(&document.source)
        .bind(serde_json::to_string(&document.tags)?)
        .bind(serde_json::to_string(&document.workspace_ids)?)
        .bind(document.metadata.to_string())
        .bind(document.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, document_id: &str) -> Result<Option<KnowledgeDocument>> {
        let row = sqlx::query(
            "SELECT id, title, content, document_type, status, source, tags, workspace_ids,
                    metadata, created_at, updated_at
             FROM knowledge_documents WHERE id = ?",
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_document(&r)).transpose()
    }

    pub async fn list(&self) -> Result<Vec<KnowledgeDocument>> {
        let rows = sqlx::query(
            "SELECT id, title, content, document_type, status, source, tags, workspace_ids,
                    metadata, created_at, updated_at
             FROM knowledge_documents ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_document).collect()
    }

    pub async fn set_status(&self, document_id: &str, status: DocumentStatus) -> Result<()> {
        sqlx::query("UPDATE knowledge_documents SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete the document and its chunk rows in one transaction.
    pub async fn delete(&self, document_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM knowledge_documents WHERE id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn title_of(&self, document_id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT title FROM knowledge_documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("title")))
    }
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: String) -> Result<T> {
    Ok(serde_json::from_value(Value::String(raw))?)
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeDocument> {
    let tags: String = row.get("tags");
    let workspace_ids: String = row.get("workspace_ids");
    let metadata: String = row.get("metadata");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(KnowledgeDocument {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        document_type: parse_enum::<DocumentType>(row.get("document_type"))?,
        status: parse_enum::<DocumentStatus>(row.get("status"))?,
        source: row.get("source"),
        tags: serde_json::from_str(&tags)?,
        workspace_ids: serde_json::from_str(&workspace_ids)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn document_round_trip_with_status() {
        let repo = KnowledgeRepository::new(test_pool().await);
        let document =
            KnowledgeDocument::new("Onboarding", "step one").with_tags(vec!["hr".to_string()]);
        repo.upsert(&document).await.unwrap();

        repo.set_status(&document.id, DocumentStatus::Published)
            .await
            .unwrap();
        let loaded = repo.get(&document.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, DocumentStatus::Published);
        assert_eq!(loaded.tags, vec!["hr"]);
        assert_eq!(repo.title_of(&document.id).await.unwrap().unwrap(), "Onboarding");
    }

    #[tokio::test]
    async fn delete_removes_chunks_too() {
        let pool = test_pool().await;
        let repo = KnowledgeRepository::new(pool.clone());
        let document = KnowledgeDocument::new("Doc", "content");
        repo.upsert(&document).await.unwrap();
        sqlx::query(
            "INSERT INTO document_chunks (id, document_id, content, chunk_index) VALUES ('c1', ?, 'x', 0)",
        )
        .bind(&document.id)
        .execute(&pool)
        .await
        .unwrap();

        assert!(repo.delete(&document.id).await.unwrap());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
