// User memories. All access is scoped by user_id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::{DeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    General,
    Preference,
    Fact,
    Workflow,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Preference => "preference",
            Self::Fact => "fact",
            Self::Workflow => "workflow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    Agent,
    User,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMemory {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub category: MemoryCategory,
    pub source: MemorySource,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMemory {
    pub content: String,
    #[serde(default = "default_category")]
    pub category: MemoryCategory,
    #[serde(default = "default_source")]
    pub source: MemorySource,
    pub metadata: Option<Value>,
}

fn default_category() -> MemoryCategory {
    MemoryCategory::General
}

fn default_source() -> MemorySource {
    MemorySource::Agent
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMemory {
    pub content: Option<String>,
    pub category: Option<MemoryCategory>,
}

const MAX_CONTENT_LEN: usize = 5000;

#[derive(Debug, Clone)]
pub struct MemoryRepository {
    pool: SqlitePool,
}

impl MemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, data: CreateMemory) -> Result<UserMemory> {
        if data.content.is_empty() || data.content.len() > MAX_CONTENT_LEN {
            return Err(DeskError::Validation(format!(
                "memory content must be 1..={MAX_CONTENT_LEN} characters"
            )));
        }
        let memory = UserMemory {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content: data.content,
            category: data.category,
            source: data.source,
            metadata: data.metadata,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO user_memories (id, user_id, content, category, source, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&memory.id)
        .bind(&memory.user_id)
        .bind(&memory.content)
        .bind(memory.category.as_str())
        .bind(memory.source.as_str())
        .bind(memory.metadata.as_ref().map(Value::to_string))
        .bind(memory.created_at.to_rfc3339())
        .bind(memory.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(memory)
    }

    pub async fn get(&self, user_id: &str, memory_id: &str) -> Result<Option<UserMemory>> {
        let row = sqlx::query(
            "SELECT id, user_id, content, category, source, metadata, created_at, updated_at
             FROM user_memories WHERE id = ? AND user_id = ?",
        )
        .bind(memory_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_memory(&r)).transpose()
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        category: Option<MemoryCategory>,
    ) -> Result<Vec<UserMemory>> {
        let rows = match category {
            Some(c) => {
                sqlx::query(
                    "SELECT id, user_id, content, category, source, metadata, created_at, updated_at
                     FROM user_memories WHERE user_id = ? AND category = ?
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .bind(c.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, user_id, content, category, source, metadata, created_at, updated_at
                     FROM user_memories WHERE user_id = ?
                     ORDER BY created_at DESC",
                )
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(row_to_memory).collect()
    }

    pub async fn update(
        &self,
        user_id: &str,
        memory_id: &str,
        data: UpdateMemory,
    ) -> Result<Option<UserMemory>> {
        let Some(mut memory) = self.get(user_id, memory_id).await? else {
            return Ok(None);
        };
        if let Some(content) = data.content {
            if content.is_empty() || content.len() > MAX_CONTENT_LEN {
                return Err(DeskError::Validation(format!(
                    "memory content must be 1..={MAX_CONTENT_LEN} characters"
                )));
            }
            memory.content = content;
        }
        if let Some(category) = data.category {
            memory.category = category;
        }
        memory.updated_at = Utc::now();
        sqlx::query(
            "UPDATE user_memories SET content = ?, category = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(&memory.content)
        .bind(memory.category.as_str())
        .bind(memory.updated_at.to_rfc3339())
        .bind(memory_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(Some(memory))
    }

    pub async fn delete(&self, user_id: &str, memory_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_memories WHERE id = ? AND user_id = ?")
            .bind(memory_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Word-level text search. Words of 3+ characters from the query (at most
    /// five) are OR-matched against memory content, newest first, limit 10.
    pub async fn search(&self, user_id: &str, query: &str) -> Result<Vec<UserMemory>> {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() >= 3)
            .take(5)
            .map(str::to_string)
            .collect();
        if words.is_empty() {
            return Ok(Vec::new());
        }

        let conditions = words
            .iter()
            .map(|_| "content LIKE ?")
            .collect::<Vec<_>>()
            .join(" OR ");
        let sql = format!(
            "SELECT id, user_id, content, category, source, metadata, created_at, updated_at
             FROM user_memories WHERE user_id = ? AND ({conditions})
             ORDER BY created_at DESC LIMIT 10"
        );
        let mut q = sqlx::query(&sql).bind(user_id);
        for word in &words {
            q = q.bind(format!("%{word}%"));
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_memory).collect()
    }
}

fn row_to_memory(row: &sqlx::sqlite::SqliteRow) -> Result<UserMemory> {
    let category: String = row.get("category");
    let source: String = row.get("source");
    let metadata: Option<String> = row.get("metadata");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");
    Ok(UserMemory {
        id: row.get("id"),
        user_id: row.get("user_id"),
        content: row.get("content"),
        category: serde_json::from_value(Value::String(category))?,
        source: serde_json::from_value(Value::String(source))?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
