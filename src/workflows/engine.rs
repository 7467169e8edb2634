// Workflow lifecycle: start, resume, cancel, status. The engine owns state
// transitions; advancing through step bodies happens under the executor's
// advisory lock, outside this surface.

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::workflows::models::{
    StepDefinition, StepStatus, StepType, Trigger, WebhookRegistration, WebhookStatus, Workflow,
    WorkflowStatus, WorkflowStep,
};
use crate::workflows::repository::WorkflowRepository;

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatusSummary {
    pub id: String,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub current_step: i64,
    pub total_steps: usize,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error: Option<String>,
}

pub struct WorkflowEngine {
    repo: WorkflowRepository,
    /// Advisory locks so a workflow is advanced by at most one executor.
    advance_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WorkflowEngine {
    pub fn new(repo: WorkflowRepository) -> Self {
        Self {
            repo,
            advance_locks: DashMap::new(),
        }
    }

    pub fn repository(&self) -> &WorkflowRepository {
        &self.repo
    }

    pub fn advisory_lock(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        self.advance_locks
            .entry(workflow_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Create a new workflow with dense step indices 0..n-1.
    pub async fn start(
        &self,
        workflow_type: &str,
        params: Value,
        user_id: &str,
        conversation_id: Option<&str>,
        steps: &[StepDefinition],
    ) -> Result<Workflow> {
        let workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.map(str::to_string),
            user_id: user_id.to_string(),
            workspace_id: None,
            workflow_type: workflow_type.to_string(),
            status: WorkflowStatus::Pending,
            current_step: 0,
            state: params,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_check_at: None,
        };
        self.repo.create(&workflow).await?;

        for (index, definition) in steps.iter().enumerate() {
            let step = WorkflowStep {
                id: uuid::Uuid::new_v4().to_string(),
                workflow_id: workflow.id.clone(),
                step_index: index as i64,
                step_type: definition.step_type,
                description: definition.description.clone(),
                status: StepStatus::Pending,
                input: definition.input.clone(),
                output: None,
                error: None,
                started_at: None,
                completed_at: None,
            };
            self.repo.create_step(&step).await?;

            // wait_webhook steps get their inbound token up front so callers
            // can hand it to the external system.
            if definition.step_type == StepType::WaitWebhook {
                self.register_webhook(&workflow.id, index as i64).await?;
            }
        }

        tracing::info!(
            workflow_id = %workflow.id,
            workflow_type,
            steps = steps.len(),
            "workflow created"
        );
        Ok(workflow)
    }

    /// Register a webhook for a step, returning the registration with its
    /// high-entropy token.
    pub async fn register_webhook(
        &self,
        workflow_id: &str,
        step_index: i64,
    ) -> Result<WebhookRegistration> {
        let token = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        );
        let registration = WebhookRegistration {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            step_index,
            webhook_token: token,
            external_system: None,
            status: WebhookStatus::Active,
            expires_at: None,
            created_at: Utc::now(),
        };
        self.repo.create_webhook(&registration).await?;
        Ok(registration)
    }

    /// Resume a pending or waiting workflow. Idempotent on any other status.
    /// The trigger payload is merged into state under `trigger_<current_step>`.
    pub async fn resume(&self, workflow_id: &str, trigger: Trigger) -> Result<()> {
        let Some(workflow) = self.repo.get(workflow_id).await? else {
            tracing::warn!(workflow_id, "workflow not found for resume");
            return Ok(());
        };
        if !workflow.status.is_resumable() {
            tracing::warn!(
                workflow_id,
                status = workflow.status.as_str(),
                "workflow in non-resumable status"
            );
            return Ok(());
        }

        self.repo
            .update_status(workflow_id, WorkflowStatus::Running, None)
            .await?;

        let mut state = match workflow.state {
            Value::Object(map) => Value::Object(map),
            _ => Value::Object(Default::default()),
        };
        state[format!("trigger_{}", workflow.current_step)] = trigger.payload.clone();
        self.repo
            .save_checkpoint(workflow_id, &state, None, None)
            .await?;

        tracing::debug!(
            workflow_id,
            trigger = ?trigger.trigger_type,
            step = workflow.current_step,
            "workflow resumed"
        );
        Ok(())
    }

    /// Mark a step finished and advance. When the last step completes the
    /// workflow itself completes.
    pub async fn complete_step(
        &self,
        workflow_id: &str,
        step_index: i64,
        output: Option<&Value>,
    ) -> Result<()> {
        let lock = self.advisory_lock(workflow_id);
        let _guard = lock.lock().await;

        let steps = self.repo.get_steps(workflow_id).await?;
        let Some(step) = steps.iter().find(|s| s.step_index == step_index) else {
            return Ok(());
        };
        self.repo
            .update_step_status(&step.id, StepStatus::Completed, output, None)
            .await?;

        let next = step_index + 1;
        let Some(workflow) = self.repo.get(workflow_id).await? else {
            return Ok(());
        };
        if next >= steps.len() as i64 {
            self.repo
                .save_checkpoint(workflow_id, &workflow.state, Some(steps.len() as i64), None)
                .await?;
            self.repo
                .update_status(workflow_id, WorkflowStatus::Completed, Some(Utc::now()))
                .await?;
        } else {
            self.repo
                .save_checkpoint(workflow_id, &workflow.state, Some(next), None)
                .await?;
        }
        Ok(())
    }

    pub async fn cancel(&self, workflow_id: &str) -> Result<()> {
        self.repo
            .update_status(workflow_id, WorkflowStatus::Cancelled, Some(Utc::now()))
            .await?;
        Ok(())
    }

    pub async fn get_status(&self, workflow_id: &str) -> Result<Option<WorkflowStatusSummary>> {
        let Some(workflow) = self.repo.get(workflow_id).await? else {
            return Ok(None);
        };
        let steps = self.repo.get_steps(workflow_id).await?;
        Ok(Some(WorkflowStatusSummary {
            id: workflow.id,
            workflow_type: workflow.workflow_type,
            status: workflow.status,
            current_step: workflow.current_step,
            total_steps: steps.len(),
            created_at: workflow.created_at.to_rfc3339(),
            started_at: workflow.started_at.map(|t| t.to_rfc3339()),
            completed_at: workflow.completed_at.map(|t| t.to_rfc3339()),
            error: workflow.error,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::workflows::models::TriggerType;
    use serde_json::json;

    async fn engine() -> WorkflowEngine {
        WorkflowEngine::new(WorkflowRepository::new(test_pool().await))
    }

    fn step(step_type: StepType) -> StepDefinition {
        StepDefinition {
            step_type,
            description: String::new(),
            input: None,
        }
    }

    #[tokio::test]
    async fn start_creates_pending_workflow_with_dense_steps() {
        let engine = engine().await;
        let workflow = engine
            .start(
                "vendor_onboard",
                json!({"vendor": "acme"}),
                "u1",
                Some("c1"),
                &[step(StepType::ToolCall), step(StepType::WaitWebhook), step(StepType::Notify)],
            )
            .await
            .unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Pending);
        let steps = engine.repository().get_steps(&workflow.id).await.unwrap();
        assert_eq!(steps.len(), 3);
        for (i, s) in steps.iter().enumerate() {
            assert_eq!(s.step_index, i as i64);
        }
        assert_eq!(steps[1].step_type, StepType::WaitWebhook);
    }

    #[tokio::test]
    async fn resume_merges_trigger_payload_into_state() {
        let engine = engine().await;
        let workflow = engine
            .start("t", json!({}), "u1", None, &[step(StepType::WaitWebhook)])
            .await
            .unwrap();
        engine
            .repository()
            .save_checkpoint(&workflow.id, &json!({}), Some(1), None)
            .await
            .unwrap();
        engine
            .repository()
            .update_status(&workflow.id, WorkflowStatus::Waiting, None)
            .await
            .unwrap();

        engine
            .resume(
                &workflow.id,
                Trigger::new(TriggerType::Webhook)
                    .with_step(1)
                    .with_payload(json!({"approved": true})),
            )
            .await
            .unwrap();

        let loaded = engine.repository().get(&workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Running);
        assert_eq!(loaded.state["trigger_1"], json!({"approved": true}));
    }

    #[tokio::test]
    async fn resume_is_idempotent_on_terminal_status() {
        let engine = engine().await;
        let workflow = engine.start("t", json!({}), "u1", None, &[]).await.unwrap();
        engine
            .repository()
            .update_status(&workflow.id, WorkflowStatus::Completed, Some(Utc::now()))
            .await
            .unwrap();

        engine
            .resume(&workflow.id, Trigger::new(TriggerType::Webhook))
            .await
            .unwrap();
        let loaded = engine.repository().get(&workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn resume_unknown_workflow_is_a_noop() {
        let engine = engine().await;
        engine
            .resume("missing", Trigger::new(TriggerType::Poll))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_sets_status_and_completed_at() {
        let engine = engine().await;
        let workflow = engine.start("t", json!({}), "u1", None, &[]).await.unwrap();
        engine.cancel(&workflow.id).await.unwrap();

        let loaded = engine.repository().get(&workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, WorkflowStatus::Cancelled);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn completing_all_steps_completes_the_workflow() {
        let engine = engine().await;
        let workflow = engine
            .start("t", json!({}), "u1", None, &[step(StepType::ToolCall), step(StepType::Notify)])
            .await
            .unwrap();

        engine.complete_step(&workflow.id, 0, None).await.unwrap();
        let mid = engine.get_status(&workflow.id).await.unwrap().unwrap();
        assert_eq!(mid.current_step, 1);
        assert_ne!(mid.status, WorkflowStatus::Completed);

        engine
            .complete_step(&workflow.id, 1, Some(&json!({"notified": true})))
            .await
            .unwrap();
        let done = engine.get_status(&workflow.id).await.unwrap().unwrap();
        assert_eq!(done.status, WorkflowStatus::Completed);
        assert_eq!(done.current_step, done.total_steps as i64);

        let steps = engine.repository().get_steps(&workflow.id).await.unwrap();
        assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    }

    #[tokio::test]
    async fn get_status_unknown_is_none() {
        let engine = engine().await;
        assert!(engine.get_status("missing").await.unwrap().is_none());
    }
}
