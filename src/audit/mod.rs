// Append-only audit trail. Events are never mutated; retention is enforced
// by a time-based purge.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ToolCall,
    ToolResult,
    ConfirmationRequested,
    ConfirmationResponse,
    AgentResponse,
    AuthLogin,
    AuthLogout,
    CatalogChange,
    KnowledgeUpdate,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::ConfirmationRequested => "confirmation_requested",
            Self::ConfirmationResponse => "confirmation_response",
            Self::AgentResponse => "agent_response",
            Self::AuthLogin => "auth_login",
            Self::AuthLogout => "auth_logout",
            Self::CatalogChange => "catalog_change",
            Self::KnowledgeUpdate => "knowledge_update",
        }
    }
}

/// An immutable audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub system_id: Option<String>,
    pub endpoint_id: Option<String>,
    pub action: String,
    pub detail: Value,
    pub risk_level: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            user_id: user_id.into(),
            conversation_id: None,
            system_id: None,
            endpoint_id: None,
            action: action.into(),
            detail: Value::Object(Default::default()),
            risk_level: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_risk_level(mut self, risk_level: impl Into<String>) -> Self {
        self.risk_level = Some(risk_level.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct AuditRepository {
    pool: SqlitePool,
}

impl AuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &AuditEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO audit_events
             (id, timestamp, event_type, user_id, conversation_id, system_id, endpoint_id, action, detail, risk_level)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(event.timestamp.to_rfc3339())
        .bind(event.event_type.as_str())
        .bind(&event.user_id)
        .bind(&event.conversation_id)
        .bind(&event.system_id)
        .bind(&event.endpoint_id)
        .bind(&event.action)
        .bind(event.detail.to_string())
        .bind(&event.risk_level)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List recent events, newest first. `limit` is capped at 500.
    pub async fn list_recent(&self, limit: u32) -> Result<Vec<AuditEvent>> {
        let limit = limit.min(500);
        let rows = sqlx::query(
            "SELECT id, timestamp, event_type, user_id, conversation_id, system_id,
                    endpoint_id, action, detail, risk_level
             FROM audit_events ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }

    /// Delete events older than `retention_days`. Returns the rows removed.
    pub async fn purge_older_than(&self, retention_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let result = sqlx::query("DELETE FROM audit_events WHERE timestamp < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent> {
    let event_type: String = row.get("event_type");
    let detail: String = row.get("detail");
    let timestamp: String = row.get("timestamp");
    Ok(AuditEvent {
        id: row.get("id"),
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        event_type: serde_json::from_value(Value::String(event_type))?,
        user_id: row.get("user_id"),
        conversation_id: row.get("conversation_id"),
        system_id: row.get("system_id"),
        endpoint_id: row.get("endpoint_id"),
        action: row.get("action"),
        detail: serde_json::from_str(&detail).unwrap_or(Value::Null),
        risk_level: row.get("risk_level"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn record_and_list() {
        let repo = AuditRepository::new(test_pool().await);
        let event = AuditEvent::new(AuditEventType::ToolCall, "u1", "crm.get_customer")
            .with_conversation("c1")
            .with_detail(json!({"args": {"id": 7}}))
            .with_risk_level("read");
        repo.record(&event).await.unwrap();

        let events = repo.list_recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, "crm.get_customer");
        assert_eq!(events[0].event_type, AuditEventType::ToolCall);
        assert_eq!(events[0].detail["args"]["id"], 7);
    }

    #[tokio::test]
    async fn purge_removes_only_old_events() {
        let repo = AuditRepository::new(test_pool().await);
        let mut old = AuditEvent::new(AuditEventType::AgentResponse, "u1", "reply");
        old.timestamp = Utc::now() - Duration::days(400);
        repo.record(&old).await.unwrap();
        repo.record(&AuditEvent::new(AuditEventType::AgentResponse, "u1", "reply"))
            .await
            .unwrap();

        let removed = repo.purge_older_than(365).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.list_recent(10).await.unwrap().len(), 1);
    }
}
