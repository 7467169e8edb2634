use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::Result;
use crate::workflows::models::{
    StepStatus, StepType, WebhookRegistration, WebhookStatus, Workflow, WorkflowStatus,
    WorkflowStep,
};

#[derive(Debug, Clone)]
pub struct WorkflowRepository {
    pool: SqlitePool,
}

impl WorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, workflow: &Workflow) -> Result<()> {
        sqlx::query(
            "INSERT INTO workflows
             (id, conversation_id, user_id, workspace_id, workflow_type, status, current_step,
              state, result, error, created_at, started_at, completed_at, next_check_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id)
        .bind(&workflow.conversation_id)
        .bind(&workflow.user_id)
        .bind(&workflow.workspace_id)
        .bind(&workflow.workflow_type)
        .bind(workflow.status.as_str())
        .bind(workflow.current_step)
        .bind(workflow.state.to_string())
        .bind(workflow.result.as_ref().map(Value::to_string))
        .bind(&workflow.error)
        .bind(workflow.created_at.to_rfc3339())
        .bind(workflow.started_at.map(|t| t.to_rfc3339()))
        .bind(workflow.completed_at.map(|t| t.to_rfc3339()))
        .bind(workflow.next_check_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let row = sqlx::query(
            "SELECT id, conversation_id, user_id, workspace_id, workflow_type, status,
                    current_step, state, result, error, created_at, started_at, completed_at,
                    next_check_at
             FROM workflows WHERE id = ?",
        )
        .bind(workflow_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_workflow(&r)).transpose()
    }

    pub async fn update_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match completed_at {
            Some(at) => {
                sqlx::query("UPDATE workflows SET status = ?, completed_at = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(at.to_rfc3339())
                    .bind(workflow_id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE workflows SET status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(workflow_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Persist a state checkpoint, optionally advancing current_step and the
    /// poll timer.
    pub async fn save_checkpoint(
        &self,
        workflow_id: &str,
        state: &Value,
        current_step: Option<i64>,
        next_check_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match current_step {
            Some(step) => {
                sqlx::query(
                    "UPDATE workflows SET state = ?, current_step = ?, next_check_at = ? WHERE id = ?",
                )
                .bind(state.to_string())
                .bind(step)
                .bind(next_check_at.map(|t| t.to_rfc3339()))
                .bind(workflow_id)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query("UPDATE workflows SET state = ? WHERE id = ?")
                    .bind(state.to_string())
                    .bind(workflow_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn set_result(&self, workflow_id: &str, result: &Value) -> Result<()> {
        sqlx::query("UPDATE workflows SET result = ? WHERE id = ?")
            .bind(result.to_string())
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_error(&self, workflow_id: &str, error: &str) -> Result<()> {
        sqlx::query("UPDATE workflows SET error = ?, status = ?, completed_at = ? WHERE id = ?")
            .bind(error)
            .bind(WorkflowStatus::Failed.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(workflow_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_step(&self, step: &WorkflowStep) -> Result<()> {
        sqlx::query(
            "INSERT INTO workflow_steps
             (id, workflow_id, step_index, step_type, description, status, input, output, error,
              started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id)
        .bind(&step.workflow_id)
        .bind(step.step_index)
        .bind(step.step_type.as_str())
        .bind(&step.description)
        .bind(step.status.as_str())
        .bind(step.input.as_ref().map(Value::to_string))
        .bind(step.output.as_ref().map(Value::to_string))
        .bind(&step.error)
        .bind(step.started_at.map(|t| t.to_rfc3339()))
        .bind(step.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Steps in step_index order.
    pub async fn get_steps(&self, workflow_id: &str) -> Result<Vec<WorkflowStep>> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, step_index, step_type, description, status, input, output,
                    error, started_at, completed_at
             FROM workflow_steps WHERE workflow_id = ? ORDER BY step_index ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_step).collect()
    }

    pub async fn update_step_status(
        &self,
        step_id: &str,
        status: StepStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE workflow_steps SET status = ?, output = COALESCE(?, output),
                    error = COALESCE(?, error),
                    started_at = COALESCE(started_at, ?),
                    completed_at = CASE WHEN ? IN ('completed', 'failed', 'skipped') THEN ? ELSE completed_at END
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(output.map(Value::to_string))
        .bind(error)
        .bind(&now)
        .bind(status.as_str())
        .bind(&now)
        .bind(step_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Workflows in `waiting` whose poll timer is due.
    pub async fn list_due_for_poll(&self, now: DateTime<Utc>) -> Result<Vec<Workflow>> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, user_id, workspace_id, workflow_type, status,
                    current_step, state, result, error, created_at, started_at, completed_at,
                    next_check_at
             FROM workflows
             WHERE status = 'waiting' AND next_check_at IS NOT NULL AND next_check_at <= ?",
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(|r| row_to_workflow(r)).collect()
    }

    // -- webhook registrations --

    pub async fn create_webhook(&self, registration: &WebhookRegistration) -> Result<()> {
        sqlx::query(
            "INSERT INTO webhook_registrations
             (id, workflow_id, step_index, webhook_token, external_system, status, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&registration.id)
        .bind(&registration.workflow_id)
        .bind(registration.step_index)
        .bind(&registration.webhook_token)
        .bind(&registration.external_system)
        .bind(registration.status.as_str())
        .bind(registration.expires_at.map(|t| t.to_rfc3339()))
        .bind(registration.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn webhooks_for_workflow(&self, workflow_id: &str) -> Result<Vec<WebhookRegistration>> {
        let rows = sqlx::query(
            "SELECT id, workflow_id, step_index, webhook_token, external_system, status,
                    expires_at, created_at
             FROM webhook_registrations WHERE workflow_id = ? ORDER BY step_index ASC",
        )
        .bind(workflow_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_webhook).collect()
    }

    pub async fn get_webhook_by_token(&self, token: &str) -> Result<Option<WebhookRegistration>> {
        let row = sqlx::query(
            "SELECT id, workflow_id, step_index, webhook_token, external_system, status,
                    expires_at, created_at
             FROM webhook_registrations WHERE webhook_token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_webhook(&r)).transpose()
    }

    /// Consume a webhook registration. The single conditional UPDATE makes
    /// the first concurrent delivery win; all later ones see zero rows.
    pub async fn consume_webhook(&self, registration_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE webhook_registrations SET status = 'consumed' WHERE id = ? AND status = 'active'",
        )
        .bind(registration_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.map(|t| parse_ts(&t))
}

fn parse_enum<T: serde::de::DeserializeOwned>(raw: String) -> Result<T> {
    Ok(serde_json::from_value(Value::String(raw))?)
}

fn row_to_workflow(row: &sqlx::sqlite::SqliteRow) -> Result<Workflow> {
    let state: String = row.get("state");
    let result: Option<String> = row.get("result");
    let created_at: String = row.get("created_at");
    Ok(Workflow {
        id: row.get("id"),
        conversation_id: row.get("conversation_id"),
        user_id: row.get("user_id"),
        workspace_id: row.get("workspace_id"),
        workflow_type: row.get("workflow_type"),
        status: parse_enum::<WorkflowStatus>(row.get("status"))?,
        current_step: row.get("current_step"),
        state: serde_json::from_str(&state).unwrap_or(Value::Null),
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        error: row.get("error"),
        created_at: parse_ts(&created_at),
        started_at: parse_opt_ts(row.get("started_at")),
        completed_at: parse_opt_ts(row.get("completed_at")),
        next_check_at: parse_opt_ts(row.get("next_check_at")),
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowStep> {
    let input: Option<String> = row.get("input");
    let output: Option<String> = row.get("output");
    Ok(WorkflowStep {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        step_index: row.get("step_index"),
        step_type: parse_enum::<StepType>(row.get("step_type"))?,
        description: row.get("description"),
        status: parse_enum::<StepStatus>(row.get("status"))?,
        input: input.and_then(|i| serde_json::from_str(&i).ok()),
        output: output.and_then(|o| serde_json::from_str(&o).ok()),
        error: row.get("error"),
        started_at: parse_opt_ts(row.get("started_at")),
        completed_at: parse_opt_ts(row.get("completed_at")),
    })
}

fn row_to_webhook(row: &sqlx::sqlite::SqliteRow) -> Result<WebhookRegistration> {
    let created_at: String = row.get("created_at");
    Ok(WebhookRegistration {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        step_index: row.get("step_index"),
        webhook_token: row.get("webhook_token"),
        external_system: row.get("external_system"),
        status: parse_enum::<WebhookStatus>(row.get("status"))?,
        expires_at: parse_opt_ts(row.get("expires_at")),
        created_at: parse_ts(&created_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn workflow(id: &str) -> Workflow {
        Workflow {
            id: id.to_string(),
            conversation_id: None,
            user_id: "u1".to_string(),
            workspace_id: None,
            workflow_type: "test".to_string(),
            status: WorkflowStatus::Pending,
            current_step: 0,
            state: serde_json::json!({}),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_check_at: None,
        }
    }

    #[tokio::test]
    async fn webhook_consumption_is_exactly_once() {
        let repo = WorkflowRepository::new(test_pool().await);
        repo.create(&workflow("wf1")).await.unwrap();
        let registration = WebhookRegistration {
            id: "reg1".to_string(),
            workflow_id: "wf1".to_string(),
            step_index: 1,
            webhook_token: "tok".to_string(),
            external_system: None,
            status: WebhookStatus::Active,
            expires_at: None,
            created_at: Utc::now(),
        };
        repo.create_webhook(&registration).await.unwrap();

        assert!(repo.consume_webhook("reg1").await.unwrap());
        assert!(!repo.consume_webhook("reg1").await.unwrap());

        let loaded = repo.get_webhook_by_token("tok").await.unwrap().unwrap();
        assert_eq!(loaded.status, WebhookStatus::Consumed);
    }

    #[tokio::test]
    async fn due_for_poll_selects_waiting_with_elapsed_timer() {
        let repo = WorkflowRepository::new(test_pool().await);

        let mut due = workflow("due");
        due.status = WorkflowStatus::Waiting;
        due.next_check_at = Some(Utc::now() - chrono::Duration::minutes(1));
        repo.create(&due).await.unwrap();

        let mut future = workflow("future");
        future.status = WorkflowStatus::Waiting;
        future.next_check_at = Some(Utc::now() + chrono::Duration::minutes(30));
        repo.create(&future).await.unwrap();

        let mut running = workflow("running");
        running.status = WorkflowStatus::Running;
        running.next_check_at = Some(Utc::now() - chrono::Duration::minutes(1));
        repo.create(&running).await.unwrap();

        let found = repo.list_due_for_poll(Utc::now()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "due");
    }
}
