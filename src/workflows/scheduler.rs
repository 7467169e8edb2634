// Periodic scheduler for wait_poll steps. The only producer of POLL
// triggers. Tick failures are logged and retried on the next interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::workflows::engine::WorkflowEngine;
use crate::workflows::models::{StepType, Trigger, TriggerType};
use crate::workflows::repository::WorkflowRepository;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

pub struct WorkflowScheduler {
    repo: WorkflowRepository,
    engine: Arc<WorkflowEngine>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl WorkflowScheduler {
    pub fn new(
        repo: WorkflowRepository,
        engine: Arc<WorkflowEngine>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repo,
            engine,
            interval,
            shutdown,
        }
    }

    /// Spawn the scheduler loop. Runs until the shutdown token fires.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tracing::info!(interval_s = self.interval.as_secs(), "workflow scheduler started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        tracing::info!("workflow scheduler stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.tick().await {
                            tracing::error!(error = %e, "workflow scheduler tick failed");
                        }
                    }
                }
            }
        })
    }

    /// One pass: resume every waiting workflow whose poll timer is due and
    /// whose current step is a wait_poll.
    pub async fn tick(&self) -> Result<()> {
        let due = self.repo.list_due_for_poll(Utc::now()).await?;
        for workflow in due {
            let steps = self.repo.get_steps(&workflow.id).await?;
            let current_is_poll = steps
                .iter()
                .find(|s| s.step_index == workflow.current_step)
                .map(|s| s.step_type == StepType::WaitPoll)
                .unwrap_or(false);
            if !current_is_poll {
                continue;
            }

            let trigger = Trigger::new(TriggerType::Poll).with_step(workflow.current_step);
            if let Err(e) = self.engine.resume(&workflow.id, trigger).await {
                tracing::warn!(workflow_id = %workflow.id, error = %e, "poll resume failed");
            }
        }
        Ok(())
    }
}
