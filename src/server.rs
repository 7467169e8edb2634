// Application wiring and the serve loop. Repositories, the vector store,
// the provider, and every background task are assembled here.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::context::ContextEnricher;
use crate::agent::router::{ComplexityClassifier, ModelRouter, RoutingConfigRepository};
use crate::agent::{AgentRunner, AgentRunnerConfig, ConfirmationBroker, SystemPromptBuilder};
use crate::api::{build_router, AppState};
use crate::audit::AuditRepository;
use crate::callbacks::{CallbackDeliveryRepository, CallbackDispatcher};
use crate::catalog::{CatalogRepository, CredentialStore};
use crate::channels::adapters::{ChatChannelAdapter, EmailChannelAdapter};
use crate::channels::ChannelRouter;
use crate::config::DeskConfig;
use crate::conversation::ConversationRepository;
use crate::db;
use crate::error::Result;
use crate::feedback::FeedbackRepository;
use crate::jobs::handlers::{IndexingJobHandler, ProcessDiscoveryHandler, SourceSyncHandler};
use crate::jobs::runner::JobHandler;
use crate::jobs::{JobRepository, JobRunner};
use crate::knowledge::embedding::{EmbeddingProvider, HashingEmbedder, HttpEmbedder};
use crate::knowledge::stores::create_vector_store;
use crate::knowledge::{KnowledgeIndexer, KnowledgeRepository, KnowledgeRetriever};
use crate::llm::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::LlmProvider;
use crate::memory::MemoryRepository;
use crate::tools::builtin::BuiltinTools;
use crate::tools::{AuthResolver, CustomToolRepository, SandboxExecutor, ToolInvoker};
use crate::workflows::{WorkflowEngine, WorkflowRepository, WorkflowScheduler};
use crate::workspaces::WorkspaceRepository;

const JOB_WORKERS: usize = 4;
const AUDIT_PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct App {
    pub state: AppState,
    pub shutdown: CancellationToken,
    scheduler: Option<WorkflowScheduler>,
}

/// Build the full application graph against the configured database.
pub async fn build(config: DeskConfig) -> Result<App> {
    let config = Arc::new(config);
    let rate_limit_per_user = config.rate_limit_per_user;
    let pool = db::init_pool(&config.database_url).await?;
    let shutdown = CancellationToken::new();

    let conversations = ConversationRepository::new(pool.clone());
    let audit = AuditRepository::new(pool.clone());
    let memories = MemoryRepository::new(pool.clone());
    let feedback = FeedbackRepository::new(pool.clone());
    let catalog = CatalogRepository::new(pool.clone());
    let workspaces = WorkspaceRepository::new(pool.clone());
    let custom_tools = CustomToolRepository::new(pool.clone());
    let knowledge = KnowledgeRepository::new(pool.clone());
    let workflow_repo = WorkflowRepository::new(pool.clone());
    let job_repo = JobRepository::new(pool.clone());

    let encryption_key = if config.credential_encryption_key.is_empty() && config.dev_mode {
        // Dev deployments get an ephemeral key; production fails fast.
        uuid::Uuid::new_v4().simple().to_string()
    } else {
        config.credential_encryption_key.clone()
    };
    let credentials = CredentialStore::new(pool.clone(), &encryption_key)?;

    let vector_store = create_vector_store(&config, Some(pool.clone())).await?;
    let embedder: Arc<dyn EmbeddingProvider> = if config.embedding_api_key.is_empty() {
        tracing::warn!("no embedding API key configured, using the hashing embedder");
        Arc::new(HashingEmbedder::new(config.embedding_dimensions))
    } else {
        let (_, model) = config.embedding_provider_model();
        Arc::new(HttpEmbedder::new(
            config.embedding_base_url.clone(),
            config.embedding_api_key.clone(),
            model,
        ))
    };
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

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatibleProvider::new(
        "openai_compatible",
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.llm_model.clone(),
    ));

    let routing_config = RoutingConfigRepository::with_default_ttl(pool.clone());
    let classifier = ComplexityClassifier::new(provider.clone(), None);
    let router = ModelRouter::new(classifier, routing_config.clone());

    let builtins = Arc::new(BuiltinTools::new(
        memories.clone(),
        retriever.clone(),
        catalog.clone(),
    ));
    let enricher = ContextEnricher::new(
        config.agent_name.clone(),
        catalog.clone(),
        custom_tools.clone(),
        retriever.clone(),
        memories.clone(),
        feedback.clone(),
        builtins.clone(),
    );
    let invoker = Arc::new(ToolInvoker::new(
        AuthResolver::new(credentials.clone()),
        Vec::new(),
    ));
    let confirmations = Arc::new(ConfirmationBroker::new());
    let runner = Arc::new(AgentRunner::new(
        conversations.clone(),
        Some(router),
        enricher,
        SystemPromptBuilder::with_defaults()?,
        provider.clone(),
        invoker,
        SandboxExecutor::default(),
        builtins,
        catalog.clone(),
        audit.clone(),
        confirmations.clone(),
        AgentRunnerConfig {
            max_tools_per_turn: config.max_tools_per_turn,
            ..Default::default()
        },
    ));

    let workflow_engine = Arc::new(WorkflowEngine::new(workflow_repo.clone()));
    let scheduler = WorkflowScheduler::new(
        workflow_repo.clone(),
        workflow_engine.clone(),
        crate::workflows::scheduler::DEFAULT_INTERVAL,
        shutdown.clone(),
    );

    let mut handlers: HashMap<String, Arc<dyn JobHandler>> = HashMap::new();
    handlers.insert(
        "indexing".to_string(),
        Arc::new(IndexingJobHandler::new(indexer.clone())),
    );
    handlers.insert(
        "process_discovery".to_string(),
        Arc::new(ProcessDiscoveryHandler::new(audit.clone())),
    );
    handlers.insert(
        "source_sync".to_string(),
        Arc::new(SourceSyncHandler::new(knowledge.clone(), indexer.clone())),
    );
    let jobs = Arc::new(JobRunner::new(
        job_repo,
        handlers,
        JOB_WORKERS,
        shutdown.clone(),
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
        config,
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
        provider,
        rate_limiter: Arc::new(crate::api::rate_limit::RateLimiter::new(
            rate_limit_per_user,
        )),
    };

    Ok(App {
        state,
        shutdown,
        scheduler: Some(scheduler),
    })
}

impl App {
    /// Start background loops: workflow scheduler, job workers, audit purge.
    pub async fn start_background_tasks(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.start();
        }
        self.state.jobs.start().await;

        let audit = self.state.audit.clone();
        let retention_days = self.state.config.audit_retention_days;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUDIT_PURGE_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = ticker.tick() => {
                        match audit.purge_older_than(retention_days).await {
                            Ok(removed) if removed > 0 => {
                                tracing::info!(removed, "purged expired audit events");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "audit purge failed"),
                        }
                    }
                }
            }
        });
    }
}

/// Run the HTTP server until interrupted.
pub async fn serve(config: DeskConfig, port: u16) -> Result<()> {
    let mut app = build(config).await?;
    app.start_background_tasks().await;

    let router = build_router(app.state.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| crate::error::DeskError::Configuration(format!("cannot bind port {port}: {e}")))?;
    tracing::info!(port, "flydesk listening");

    let shutdown = app.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await
        .map_err(|e| crate::error::DeskError::Configuration(format!("server error: {e}")))?;
    Ok(())
}
