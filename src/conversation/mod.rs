// Conversations and their append-only message logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::{DeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// A single message within a conversation. Immutable after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub turn_id: Option<String>,
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: &str, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role,
            content: content.into(),
            metadata: Value::Object(Default::default()),
            turn_id: None,
            token_count: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_turn(mut self, turn_id: &str) -> Self {
        self.turn_id = Some(turn_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub user_id: String,
    pub model_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: &str, title: Option<&str>) -> Result<Conversation> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.map(str::to_string),
            user_id: user_id.to_string(),
            model_id: None,
            metadata: Value::Object(Default::default()),
            message_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        sqlx::query(
            "INSERT INTO conversations (id, title, user_id, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.title)
        .bind(&conversation.user_id)
        .bind(conversation.metadata.to_string())
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(conversation)
    }

    pub async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, title, user_id, model_id, metadata, message_count,
                    created_at, updated_at, deleted_at
             FROM conversations WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_conversation(&r)).transpose()
    }

    pub async fn get_with_messages(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationWithMessages>> {
        let Some(conversation) = self.get(conversation_id).await? else {
            return Ok(None);
        };
        let messages = self.list_messages(conversation_id).await?;
        Ok(Some(ConversationWithMessages {
            conversation,
            messages,
        }))
    }

    /// Append a message and bump the parent's message_count in one transaction.
    pub async fn append_message(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE conversations
             SET message_count = message_count + 1, updated_at = ?
             WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&message.conversation_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(DeskError::NotFound(format!(
                "conversation {}",
                message.conversation_id
            )));
        }
        sqlx::query(
            "INSERT INTO messages
             (id, conversation_id, role, content, metadata, turn_id, token_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.metadata.to_string())
        .bind(&message.turn_id)
        .bind(message.token_count)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Messages in chronological append order.
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, role, content, metadata, turn_id, token_count, created_at
             FROM messages WHERE conversation_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    pub async fn soft_delete(&self, conversation_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE conversations SET deleted_at = ? WHERE id = ? AND user_id = ? AND deleted_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, title, user_id, model_id, metadata, message_count,
                    created_at, updated_at, deleted_at
             FROM conversations WHERE user_id = ? AND deleted_at IS NULL
             ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| row_to_conversation(r)).collect()
    }
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
    let metadata: String = row.get("metadata");
    Ok(Conversation {
        id: row.get("id"),
        title: row.get("title"),
        user_id: row.get("user_id"),
        model_id: row.get("model_id"),
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        message_count: row.get("message_count"),
        created_at: parse_ts(row.get("created_at")),
        updated_at: parse_ts(row.get("updated_at")),
        deleted_at: row
            .get::<Option<String>, _>("deleted_at")
            .map(|t| parse_ts(t)),
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let role: String = row.get("role");
    let metadata: String = row.get("metadata");
    Ok(Message {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        role: serde_json::from_value(Value::String(role))?,
        content: row.get("content"),
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        turn_id: row.get("turn_id"),
        token_count: row.get("token_count"),
        created_at: parse_ts(row.get("created_at")),
    })
}
