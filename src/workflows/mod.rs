// Durable workflows: persistent state machines resumed by triggers and
// advanced by a poll scheduler.

pub mod engine;
pub mod models;
pub mod repository;
pub mod scheduler;

pub use engine::WorkflowEngine;
pub use models::{
    StepStatus, StepType, Trigger, TriggerType, WebhookRegistration, Workflow, WorkflowStatus,
    WorkflowStep,
};
pub use repository::WorkflowRepository;
pub use scheduler::WorkflowScheduler;
