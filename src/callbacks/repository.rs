// Append-only delivery log, one row per attempt.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct CallbackDelivery {
    pub id: String,
    pub callback_id: String,
    pub event: String,
    pub url: String,
    pub attempt: i64,
    pub status: String,
    pub status_code: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CallbackDeliveryRepository {
    pool: SqlitePool,
}

impl CallbackDeliveryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        callback_id: &str,
        event: &str,
        url: &str,
        attempt: i64,
        status: &str,
        status_code: Option<i64>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO callback_deliveries (id, callback_id, event, url, attempt, status, status_code, error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(callback_id)
        .bind(event)
        .bind(url)
        .bind(attempt)
        .bind(status)
        .bind(status_code)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_for_callback(&self, callback_id: &str) -> Result<Vec<CallbackDelivery>> {
        let rows = sqlx::query(
            "SELECT id, callback_id, event, url, attempt, status, status_code, error, created_at
             FROM callback_deliveries WHERE callback_id = ? ORDER BY created_at ASC, attempt ASC",
        )
        .bind(callback_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                CallbackDelivery {
                    id: row.get("id"),
                    callback_id: row.get("callback_id"),
                    event: row.get("event"),
                    url: row.get("url"),
                    attempt: row.get("attempt"),
                    status: row.get("status"),
                    status_code: row.get("status_code"),
                    error: row.get("error"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map(|t| t.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                }
            })
            .collect())
    }
}
