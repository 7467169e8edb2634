// Job persistence. Progress is monotonic and terminal statuses are sticky,
// both enforced here so every writer gets the same guarantees.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::jobs::models::{Job, JobStatus};

#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO jobs (id, job_type, status, progress_pct, progress_message, result, error, payload, created_at, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&job.job_type)
        .bind(job.status.as_str())
        .bind(job.progress_pct)
        .bind(&job.progress_message)
        .bind(job.result.as_ref().map(Value::to_string))
        .bind(&job.error)
        .bind(job.payload.to_string())
        .bind(job.created_at.to_rfc3339())
        .bind(job.started_at.map(|t| t.to_rfc3339()))
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, job_type, status, progress_pct, progress_message, result, error, payload,
                    created_at, started_at, completed_at
             FROM jobs WHERE id = ?",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn mark_running(&self, job_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = 'running', started_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record progress. Decreases and updates after a terminal status are
    /// ignored.
    pub async fn update_progress(&self, job_id: &str, pct: i64, message: &str) -> Result<()> {
        let pct = pct.clamp(0, 100);
        sqlx::query(
            "UPDATE jobs SET progress_pct = ?, progress_message = ?
             WHERE id = ? AND status = 'running' AND progress_pct <= ?",
        )
        .bind(pct)
        .bind(message)
        .bind(job_id)
        .bind(pct)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET status = ?, result = ?, error = ?, completed_at = ?
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(status.as_str())
        .bind(result.map(Value::to_string))
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_recent(&self, limit: u32) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "SELECT id, job_type, status, progress_pct, progress_message, result, error, payload,
                    created_at, started_at, completed_at
             FROM jobs ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit.min(500))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let status: String = row.get("status");
    let result: Option<String> = row.get("result");
    let payload: String = row.get("payload");
    let created_at: String = row.get("created_at");
    let parse = |raw: Option<String>| {
        raw.and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc))
    };
    Ok(Job {
        id: row.get("id"),
        job_type: row.get("job_type"),
        status: serde_json::from_value(Value::String(status))?,
        progress_pct: row.get("progress_pct"),
        progress_message: row.get("progress_message"),
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        error: row.get("error"),
        payload: serde_json::from_str(&payload).unwrap_or(Value::Null),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        started_at: parse(row.get("started_at")),
        completed_at: parse(row.get("completed_at")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use serde_json::json;

    #[tokio::test]
    async fn progress_is_monotonic() {
        let repo = JobRepository::new(test_pool().await);
        let job = Job::new("indexing", json!({}));
        repo.create(&job).await.unwrap();
        repo.mark_running(&job.id).await.unwrap();

        repo.update_progress(&job.id, 40, "chunking").await.unwrap();
        repo.update_progress(&job.id, 10, "rewind").await.unwrap();
        let loaded = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.progress_pct, 40);
        assert_eq!(loaded.progress_message, "chunking");

        repo.update_progress(&job.id, 90, "embedding").await.unwrap();
        assert_eq!(repo.get(&job.id).await.unwrap().unwrap().progress_pct, 90);
    }

    #[tokio::test]
    async fn terminal_status_is_sticky() {
        let repo = JobRepository::new(test_pool().await);
        let job = Job::new("indexing", json!({}));
        repo.create(&job).await.unwrap();
        repo.mark_running(&job.id).await.unwrap();
        repo.finish(&job.id, JobStatus::Completed, Some(&json!({"ok": true})), None)
            .await
            .unwrap();

        // Late progress and a second finish are both dropped.
        repo.update_progress(&job.id, 99, "late").await.unwrap();
        repo.finish(&job.id, JobStatus::Failed, None, Some("late failure"))
            .await
            .unwrap();

        let loaded = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(loaded.error.is_none());
        assert_ne!(loaded.progress_pct, 99);
    }
}
