// Built-in job handlers: single-document indexing, business process
// discovery, and document source sync.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::audit::AuditRepository;
use crate::error::{DeskError, Result};
use crate::jobs::runner::{JobHandler, ProgressReporter};
use crate::knowledge::models::{DocumentType, KnowledgeDocument};
use crate::knowledge::{KnowledgeIndexer, KnowledgeRepository};

#[derive(Debug, Deserialize)]
struct IndexingPayload {
    document_id: String,
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Indexes a single knowledge document. The payload is a serialized
/// indexing task.
pub struct IndexingJobHandler {
    indexer: Arc<KnowledgeIndexer>,
}

impl IndexingJobHandler {
    pub fn new(indexer: Arc<KnowledgeIndexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl JobHandler for IndexingJobHandler {
    async fn execute(
        &self,
        _job_id: &str,
        payload: &Value,
        progress: &ProgressReporter,
    ) -> Result<Value> {
        let task: IndexingPayload = serde_json::from_value(payload.clone())
            .map_err(|e| DeskError::Validation(format!("invalid indexing payload: {e}")))?;
        progress
            .report(10, &format!("Indexing document {}", task.document_id))
            .await;

        let mut document = KnowledgeDocument::new(task.title.clone(), task.content);
        document.id = task.document_id.clone();
        document.document_type = DocumentType::Other;
        document.tags = task.tags;
        let chunks = self.indexer.index_document(&document).await?;

        progress.report(100, "Indexing complete").await;
        Ok(json!({
            "document_id": task.document_id,
            "title": task.title,
            "chunks": chunks.len(),
        }))
    }
}

/// Mines the audit log for recurring tool sequences and reports them as
/// candidate business processes.
pub struct ProcessDiscoveryHandler {
    audit: AuditRepository,
}

impl ProcessDiscoveryHandler {
    pub fn new(audit: AuditRepository) -> Self {
        Self { audit }
    }
}

#[async_trait]
impl JobHandler for ProcessDiscoveryHandler {
    async fn execute(
        &self,
        _job_id: &str,
        _payload: &Value,
        progress: &ProgressReporter,
    ) -> Result<Value> {
        progress.report(10, "Collecting tool call history").await;
        let events = self.audit.list_recent(500).await?;

        let mut counts: std::collections::HashMap<String, usize> = Default::default();
        for event in events
            .iter()
            .filter(|e| e.event_type == crate::audit::AuditEventType::ToolCall)
        {
            *counts.entry(event.action.clone()).or_default() += 1;
        }

        progress.report(80, "Ranking candidate processes").await;
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let candidates: Vec<Value> = ranked
            .into_iter()
            .take(20)
            .map(|(action, count)| json!({"action": action, "occurrences": count}))
            .collect();

        Ok(json!({"candidates": candidates}))
    }
}

#[derive(Debug, Deserialize)]
struct SourceSyncPayload {
    source_id: String,
}

/// Re-indexes every stored document attributed to a source. File listing
/// against cloud providers stays behind the document-source port; the sync
/// pass here covers documents already mirrored into the store.
pub struct SourceSyncHandler {
    repository: KnowledgeRepository,
    indexer: Arc<KnowledgeIndexer>,
}

impl SourceSyncHandler {
    pub fn new(repository: KnowledgeRepository, indexer: Arc<KnowledgeIndexer>) -> Self {
        Self {
            repository,
            indexer,
        }
    }
}

#[async_trait]
impl JobHandler for SourceSyncHandler {
    async fn execute(
        &self,
        _job_id: &str,
        payload: &Value,
        progress: &ProgressReporter,
    ) -> Result<Value> {
        let task: SourceSyncPayload = serde_json::from_value(payload.clone())
            .map_err(|_| DeskError::Validation("missing source_id in payload".into()))?;
        progress
            .report(10, &format!("Starting sync for source {}", task.source_id))
            .await;

        let documents = self.repository.list().await?;
        let matching: Vec<KnowledgeDocument> = documents
            .into_iter()
            .filter(|d| d.source.as_deref() == Some(task.source_id.as_str()))
            .collect();

        let total = matching.len();
        let mut synced = 0usize;
        for (i, document) in matching.iter().enumerate() {
            self.indexer.index_document(document).await?;
            synced += 1;
            let pct = 10 + ((i + 1) * 85 / total.max(1)) as i64;
            progress
                .report(pct, &format!("Synced {synced}/{total} documents"))
                .await;
        }

        progress.report(100, "Sync complete").await;
        Ok(json!({"source_id": task.source_id, "documents_synced": synced}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEvent, AuditEventType};
    use crate::db::test_pool;
    use crate::jobs::models::{Job, JobStatus};
    use crate::jobs::repository::JobRepository;
    use crate::jobs::runner::JobRunner;
    use crate::knowledge::embedding::HashingEmbedder;
    use crate::knowledge::stores::memory::MemoryVectorStore;
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;

    async fn indexing_runner(pool: sqlx::SqlitePool) -> (JobRunner, JobRepository) {
        let indexer = Arc::new(KnowledgeIndexer::new(
            KnowledgeRepository::new(pool.clone()),
            Arc::new(HashingEmbedder::default()),
            Arc::new(MemoryVectorStore::new()),
        ));
        let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert("indexing".to_string(), Arc::new(IndexingJobHandler::new(indexer)));
        let repo = JobRepository::new(pool);
        (
            JobRunner::new(repo.clone(), handlers, 1, CancellationToken::new()),
            repo,
        )
    }

    #[tokio::test]
    async fn indexing_job_reports_chunk_count() {
        let pool = test_pool().await;
        let (runner, repo) = indexing_runner(pool).await;
        let job = Job::new(
            "indexing",
            json!({
                "document_id": "doc-1",
                "title": "Handbook",
                "content": "a".repeat(900),
            }),
        );
        repo.create(&job).await.unwrap();

        let finished = runner.run_now(job).await.unwrap();
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.result.unwrap()["chunks"], 2);
    }

    #[tokio::test]
    async fn process_discovery_ranks_frequent_tools() {
        let pool = test_pool().await;
        let audit = AuditRepository::new(pool.clone());
        for _ in 0..3 {
            audit
                .record(&AuditEvent::new(AuditEventType::ToolCall, "u1", "lookup_order"))
                .await
                .unwrap();
        }
        audit
            .record(&AuditEvent::new(AuditEventType::ToolCall, "u1", "refund_order"))
            .await
            .unwrap();

        let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
        handlers.insert(
            "process_discovery".to_string(),
            Arc::new(ProcessDiscoveryHandler::new(audit)),
        );
        let repo = JobRepository::new(pool);
        let runner = JobRunner::new(repo.clone(), handlers, 1, CancellationToken::new());

        let job = Job::new("process_discovery", json!({}));
        repo.create(&job).await.unwrap();
        let finished = runner.run_now(job).await.unwrap();

        let candidates = finished.result.unwrap()["candidates"].clone();
        assert_eq!(candidates[0]["action"], "lookup_order");
        assert_eq!(candidates[0]["occurrences"], 3);
    }
}
