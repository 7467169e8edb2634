use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Resume is only meaningful from pending or waiting.
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Pending | Self::Waiting)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    AgentRun,
    ToolCall,
    WaitWebhook,
    WaitPoll,
    WaitHuman,
    Notify,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentRun => "agent_run",
            Self::ToolCall => "tool_call",
            Self::WaitWebhook => "wait_webhook",
            Self::WaitPoll => "wait_poll",
            Self::WaitHuman => "wait_human",
            Self::Notify => "notify",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Waiting,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// A single step within a workflow. `step_index` is dense and contiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub workflow_id: String,
    pub step_index: i64,
    pub step_type: StepType,
    #[serde(default)]
    pub description: String,
    pub status: StepStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub conversation_id: Option<String>,
    pub user_id: String,
    pub workspace_id: Option<String>,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub current_step: i64,
    pub state: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Active,
    Consumed,
    Expired,
}

impl WebhookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }
}

/// Tracks a webhook registered for a workflow step. Resolving the token is
/// the only inbound access path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRegistration {
    pub id: String,
    pub workflow_id: String,
    pub step_index: i64,
    pub webhook_token: String,
    pub external_system: Option<String>,
    pub status: WebhookStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    StepComplete,
    Webhook,
    Poll,
    HumanInput,
    Timer,
}

/// An event that advances a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub step_index: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

impl Trigger {
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type,
            step_index: None,
            payload: Value::Object(Default::default()),
        }
    }

    pub fn with_step(mut self, step_index: i64) -> Self {
        self.step_index = Some(step_index);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Definition of one step at workflow start.
#[derive(Debug, Clone, Deserialize)]
pub struct StepDefinition {
    pub step_type: StepType,
    #[serde(default)]
    pub description: String,
    pub input: Option<Value>,
}
