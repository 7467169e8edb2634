// Shared wiring for integration tests: a full application graph over an
// in-memory database, a scripted LLM provider, and the hashing embedder.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use flydesk::agent::context::ContextEnricher;
use flydesk::agent::router::{ComplexityClassifier, ModelRouter, RoutingConfigRepository};
use flydesk::agent::{AgentRunner, AgentRunnerConfig, ConfirmationBroker, SystemPromptBuilder};
use flydesk::api::{build_router, AppState};
use flydesk::audit::AuditRepository;
use flydesk::callbacks::{CallbackDeliveryRepository, CallbackDispatcher};
use flydesk::catalog::{CatalogRepository, CredentialStore};
use flydesk::channels::adapters::{ChatChannelAdapter, EmailChannelAdapter};
use flydesk::channels::ChannelRouter;
use flydesk::config::DeskConfig;
use flydesk::conversation::ConversationRepository;
use flydesk::db;
use flydesk::feedback::FeedbackRepository;
use flydesk::jobs::handlers::IndexingJobHandler;
use flydesk::jobs::runner::JobHandler;
use flydesk::jobs::{JobRepository, JobRunner};
use flydesk::knowledge::embedding::HashingEmbedder;
use flydesk::knowledge::stores::memory::MemoryVectorStore;
use flydesk::knowledge::{KnowledgeIndexer, KnowledgeRepository, KnowledgeRetriever};
use flydesk::llm::testing::ScriptedProvider;
use flydesk::memory::MemoryRepository;
use flydesk::tools::builtin::BuiltinTools;
use flydesk::tools::{AuthResolver, CustomToolRepository, SandboxExecutor, ToolInvoker};
use flydesk::workflows::{WorkflowEngine, WorkflowRepository};
use flydesk::workspaces::WorkspaceRepository;

pub struct Harness {
    pub state: AppState,
    pub provider: Arc<ScriptedProvider>,
    pub pool: sqlx::SqlitePool,
}

pub async fn harness() -> Harness {
    let pool = db::test_pool().await;
    let mut config = DeskConfig::from_env().expect("config");
    config.dev_mode = true;

    let conversations = ConversationRepository::new(pool.clone());
    let audit = AuditRepository::new(pool.clone());
    let memories = MemoryRepository::new(pool.clone());
    let feedback = FeedbackRepository::new(pool.clone());
    let catalog = CatalogRepository::new(pool.clone());
    let custom_tools = CustomToolRepository::new(pool.clone());
    let knowledge = KnowledgeRepository::new(pool.clone());
    let credentials = CredentialStore::new(pool.clone(), "test-key").expect("credential store");
    let workspaces = WorkspaceRepository::new(pool.clone());
    let workflow_repo = WorkflowRepository::new(pool.clone());

    let embedder = Arc::new(HashingEmbedder::default());
    let vector_store = Arc::new(MemoryVectorStore::new());
    let indexer = Arc::new(KnowledgeIndexer::new(
        knowledge.clone(),
        embedder.clone(),
        vector_store.clone(),
    ));
    let retriever = Arc::new(KnowledgeRetriever::new(
        knowledge.clone(),
        embedder,
        vector_store,
    ));

    let provider = Arc::new(ScriptedProvider::new());
    let routing_config = RoutingConfigRepository::with_default_ttl(pool.clone());
    let router = ModelRouter::new(
        ComplexityClassifier::new(provider.clone(), None),
        routing_config.clone(),
    );

    let builtins = Arc::new(BuiltinTools::new(
        memories.clone(),
        retriever.clone(),
        catalog.clone(),
    ));
    let enricher = ContextEnricher::new(
        "Ember".to_string(),
        catalog.clone(),
        custom_tools.clone(),
        retriever.clone(),
        memories.clone(),
        feedback.clone(),
        builtins.clone(),
    );
    let confirmations = Arc::new(ConfirmationBroker::new());
    let runner = Arc::new(AgentRunner::new(
        conversations.clone(),
        Some(router),
        enricher,
        SystemPromptBuilder::with_defaults().expect("templates"),
        provider.clone(),
        Arc::new(ToolInvoker::new(
            AuthResolver::new(credentials.clone()),
            Vec::new(),
        )),
        SandboxExecutor::default(),
        builtins,
        catalog.clone(),
        audit.clone(),
        confirmations.clone(),
        AgentRunnerConfig {
            max_tools_per_turn: 3,
            ..Default::default()
        },
    ));

    let workflow_engine = Arc::new(WorkflowEngine::new(workflow_repo.clone()));

    let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
    handlers.insert(
        "indexing".to_string(),
        Arc::new(IndexingJobHandler::new(indexer.clone())),
    );
    let jobs = Arc::new(JobRunner::new(
        JobRepository::new(pool.clone()),
        handlers,
        1,
        CancellationToken::new(),
    ));

    let callbacks = Arc::new(CallbackDispatcher::new(
        CallbackDeliveryRepository::new(pool.clone()),
        Vec::new(),
    ));

    let mut channels = ChannelRouter::new();
    channels.register(Box::new(ChatChannelAdapter::new(callbacks.clone())));
    channels.register(Box::new(EmailChannelAdapter));
    let channels = Arc::new(channels);

    let state = AppState {
        config: Arc::new(config),
        conversations,
        audit,
        memories,
        feedback,
        catalog,
        credentials,
        knowledge,
        retriever,
        indexer,
        workspaces,
        routing_config,
        runner,
        confirmations,
        workflow_repo,
        workflow_engine,
        callbacks,
        channels,
        jobs,
        provider: provider.clone(),
        rate_limiter: Arc::new(flydesk::api::rate_limit::RateLimiter::new(0)),
    };

    Harness {
        state,
        provider,
        pool,
    }
}

pub fn router_for(harness: &Harness) -> axum::Router {
    build_router(harness.state.clone())
}
