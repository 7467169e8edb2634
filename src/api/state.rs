// Shared application state handed to every route handler.

use std::sync::Arc;

use crate::agent::router::RoutingConfigRepository;
use crate::agent::{AgentRunner, ConfirmationBroker};
use crate::audit::AuditRepository;
use crate::callbacks::CallbackDispatcher;
use crate::catalog::{CatalogRepository, CredentialStore};
use crate::channels::ChannelRouter;
use crate::config::DeskConfig;
use crate::conversation::ConversationRepository;
use crate::feedback::FeedbackRepository;
use crate::jobs::JobRunner;
use crate::knowledge::{KnowledgeIndexer, KnowledgeRepository, KnowledgeRetriever};
use crate::llm::LlmProvider;
use crate::memory::MemoryRepository;
use crate::workflows::{WorkflowEngine, WorkflowRepository};
use crate::workspaces::WorkspaceRepository;

use super::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeskConfig>,
    pub conversations: ConversationRepository,
    pub audit: AuditRepository,
    pub memories: MemoryRepository,
    pub feedback: FeedbackRepository,
    pub catalog: CatalogRepository,
    pub credentials: CredentialStore,
    pub knowledge: KnowledgeRepository,
    pub retriever: Arc<KnowledgeRetriever>,
    pub indexer: Arc<KnowledgeIndexer>,
    pub workspaces: WorkspaceRepository,
    pub routing_config: RoutingConfigRepository,
    pub runner: Arc<AgentRunner>,
    pub confirmations: Arc<ConfirmationBroker>,
    pub workflow_repo: WorkflowRepository,
    pub workflow_engine: Arc<WorkflowEngine>,
    pub callbacks: Arc<CallbackDispatcher>,
    pub channels: Arc<ChannelRouter>,
    pub jobs: Arc<JobRunner>,
    pub provider: Arc<dyn LlmProvider>,
    pub rate_limiter: Arc<RateLimiter>,
}
