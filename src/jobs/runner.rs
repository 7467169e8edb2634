// Worker pool that executes registered handlers by job type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{DeskError, Result};
use crate::jobs::models::{Job, JobStatus};
use crate::jobs::repository::JobRepository;

/// Progress callback handed to handlers. Safe to call any number of times.
#[derive(Clone)]
pub struct ProgressReporter {
    repo: JobRepository,
    job_id: String,
}

impl ProgressReporter {
    pub async fn report(&self, pct: i64, message: &str) {
        if let Err(e) = self.repo.update_progress(&self.job_id, pct, message).await {
            tracing::warn!(job_id = %self.job_id, error = %e, "progress update failed");
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn execute(
        &self,
        job_id: &str,
        payload: &Value,
        progress: &ProgressReporter,
    ) -> Result<Value>;
}

pub struct JobRunner {
    repo: JobRepository,
    handlers: Arc<HashMap<String, Arc<dyn JobHandler>>>,
    sender: mpsc::Sender<Job>,
    receiver: tokio::sync::Mutex<Option<mpsc::Receiver<Job>>>,
    workers: usize,
    shutdown: CancellationToken,
}

impl JobRunner {
    pub fn new(
        repo: JobRepository,
        handlers: HashMap<String, Arc<dyn JobHandler>>,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        Self {
            repo,
            handlers: Arc::new(handlers),
            sender,
            receiver: tokio::sync::Mutex::new(Some(receiver)),
            workers: workers.max(1),
            shutdown,
        }
    }

    /// Persist a job and queue it for execution.
    pub async fn submit(&self, job_type: &str, payload: Value) -> Result<Job> {
        let job = Job::new(job_type, payload);
        self.repo.create(&job).await?;
        self.sender
            .send(job.clone())
            .await
            .map_err(|_| DeskError::Validation("job queue is closed".into()))?;
        Ok(job)
    }

    /// Spawn the worker pool. A single receiver is shared through a mutex so
    /// each job is claimed by exactly one worker.
    pub async fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let receiver = self
            .receiver
            .lock()
            .await
            .take()
            .expect("job runner already started");
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let receiver = receiver.clone();
            let repo = self.repo.clone();
            let handlers = self.handlers.clone();
            let shutdown = self.shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            _ = shutdown.cancelled() => return,
                            job = rx.recv() => job,
                        }
                    };
                    let Some(job) = job else { return };
                    tracing::debug!(worker_id, job_id = %job.id, job_type = %job.job_type, "job claimed");
                    run_one(&repo, &handlers, job).await;
                }
            }));
        }
        handles
    }

    /// Execute one job synchronously. Used by tests and by callers that need
    /// the result immediately.
    pub async fn run_now(&self, job: Job) -> Result<Job> {
        run_one(&self.repo, &self.handlers, job.clone()).await;
        self.repo
            .get(&job.id)
            .await?
            .ok_or_else(|| DeskError::NotFound(format!("job {}", job.id)))
    }
}

async fn run_one(
    repo: &JobRepository,
    handlers: &HashMap<String, Arc<dyn JobHandler>>,
    job: Job,
) {
    if let Err(e) = repo.mark_running(&job.id).await {
        tracing::error!(job_id = %job.id, error = %e, "failed to mark job running");
        return;
    }

    let progress = ProgressReporter {
        repo: repo.clone(),
        job_id: job.id.clone(),
    };

    let outcome = match handlers.get(&job.job_type) {
        Some(handler) => handler.execute(&job.id, &job.payload, &progress).await,
        None => Err(DeskError::Validation(format!(
            "no handler registered for job type {:?}",
            job.job_type
        ))),
    };

    let finish = match &outcome {
        Ok(result) => {
            repo.update_progress(&job.id, 100, "done").await.ok();
            repo.finish(&job.id, JobStatus::Completed, Some(result), None).await
        }
        Err(e) => repo.finish(&job.id, JobStatus::Failed, None, Some(&e.to_string())).await,
    };
    if let Err(e) = finish {
        tracing::error!(job_id = %job.id, error = %e, "failed to persist job outcome");
    }
}
