// Per-turn context enrichment: user identity, retrieved knowledge, recent
// memories, feedback summary, and the permission-filtered tool manifest.

use std::sync::Arc;

use crate::auth::UserSession;
use crate::catalog::CatalogRepository;
use crate::error::Result;
use crate::feedback::FeedbackRepository;
use crate::knowledge::KnowledgeRetriever;
use crate::llm::ToolSpec;
use crate::memory::MemoryRepository;
use crate::tools::builtin::BuiltinTools;
use crate::tools::custom::{CustomTool, CustomToolRepository};
use crate::tools::factory::{ToolDefinition, ToolFactory};

use super::prompt::PromptContext;

/// Knowledge context budget. Without a tokenizer on hand, a token is
/// approximated as four characters.
const KNOWLEDGE_MAX_TOKENS: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct EnrichmentOptions {
    pub file_context: String,
    pub conversation_summary: String,
    pub top_k: usize,
}

/// Everything the runner needs for one turn.
pub struct EnrichedContext {
    pub prompt_context: PromptContext,
    pub catalog_tools: Vec<ToolDefinition>,
    pub custom_tools: Vec<CustomTool>,
    pub tool_specs: Vec<ToolSpec>,
}

impl EnrichedContext {
    pub fn tool_names(&self) -> Vec<String> {
        self.tool_specs.iter().map(|t| t.name.clone()).collect()
    }
}

pub struct ContextEnricher {
    agent_name: String,
    catalog: CatalogRepository,
    custom_tools: CustomToolRepository,
    retriever: Arc<KnowledgeRetriever>,
    memories: MemoryRepository,
    feedback: FeedbackRepository,
    builtins: Arc<BuiltinTools>,
    tool_factory: ToolFactory,
}

impl ContextEnricher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_name: String,
        catalog: CatalogRepository,
        custom_tools: CustomToolRepository,
        retriever: Arc<KnowledgeRetriever>,
        memories: MemoryRepository,
        feedback: FeedbackRepository,
        builtins: Arc<BuiltinTools>,
    ) -> Self {
        Self {
            agent_name,
            catalog,
            custom_tools,
            retriever,
            memories,
            feedback,
            builtins,
            tool_factory: ToolFactory,
        }
    }

    pub async fn custom_tool_by_name(&self, name: &str) -> Result<Option<CustomTool>> {
        self.custom_tools.get_by_name(name).await
    }

    pub async fn enrich(
        &self,
        session: &UserSession,
        message: &str,
        options: &EnrichmentOptions,
    ) -> Result<EnrichedContext> {
        // Tool manifest: catalog tools pass the permission and scope filters,
        // custom tools and built-ins are always included.
        let endpoints = self.catalog.list_enabled_endpoints().await?;
        let catalog_tools = self.tool_factory.build_tool_definitions(
            &endpoints,
            &session.permissions,
            Some(&session.access_scopes),
        );
        let custom_tools = self.custom_tools.list_enabled().await?;

        let mut tool_specs: Vec<ToolSpec> =
            catalog_tools.iter().map(ToolDefinition::to_spec).collect();
        tool_specs.extend(custom_tools.iter().map(CustomTool::to_spec));
        tool_specs.extend(self.builtins.specs());

        // Retrieval, truncated to the knowledge token budget.
        let top_k = if options.top_k == 0 { 3 } else { options.top_k };
        let knowledge_context = match self.retriever.retrieve(message, top_k).await {
            Ok(results) => {
                let mut rendered = results
                    .iter()
                    .map(|r| format!("[{}] {}", r.document_title, r.chunk.content))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                truncate_chars(&mut rendered, KNOWLEDGE_MAX_TOKENS * 4);
                rendered
            }
            Err(e) => {
                tracing::warn!(error = %e, "knowledge retrieval failed, continuing without it");
                String::new()
            }
        };

        let memories = self
            .memories
            .list_for_user(&session.user_id, None)
            .await?
            .into_iter()
            .take(10)
            .map(|m| m.content)
            .collect();

        let feedback_summary = self.feedback.summary_for_user(&session.user_id).await?;

        let tool_summaries = tool_specs
            .iter()
            .map(|t| {
                let one_liner = t.description.lines().next().unwrap_or_default().to_string();
                (t.name.clone(), one_liner)
            })
            .collect();

        let prompt_context = PromptContext {
            agent_name: self.agent_name.clone(),
            company_name: None,
            user_name: session.display_name.clone(),
            user_roles: session.roles.clone(),
            user_department: session.department.clone().unwrap_or_default(),
            user_title: session.title.clone().unwrap_or_default(),
            tool_summaries,
            knowledge_context,
            file_context: options.file_context.clone(),
            conversation_summary: options.conversation_summary.clone(),
            feedback_summary,
            memories,
        };

        Ok(EnrichedContext {
            prompt_context,
            catalog_tools,
            custom_tools,
            tool_specs,
        })
    }
}

fn truncate_chars(text: &mut String, max_chars: usize) {
    if text.chars().count() <= max_chars {
        return;
    }
    let truncated: String = text.chars().take(max_chars).collect();
    *text = truncated;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::RiskLevel;
    use crate::catalog::repository::fixtures::{sample_endpoint, sample_system};
    use crate::db::test_pool;
    use crate::knowledge::embedding::HashingEmbedder;
    use crate::knowledge::stores::memory::MemoryVectorStore;
    use crate::knowledge::{KnowledgeIndexer, KnowledgeRepository};

    async fn build(pool: sqlx::SqlitePool) -> ContextEnricher {
        let retriever = Arc::new(KnowledgeRetriever::new(
            KnowledgeRepository::new(pool.clone()),
            Arc::new(HashingEmbedder::default()),
            Arc::new(MemoryVectorStore::new()),
        ));
        let builtins = Arc::new(BuiltinTools::new(
            MemoryRepository::new(pool.clone()),
            retriever.clone(),
            CatalogRepository::new(pool.clone()),
        ));
        ContextEnricher::new(
            "Ember".to_string(),
            CatalogRepository::new(pool.clone()),
            CustomToolRepository::new(pool.clone()),
            retriever,
            MemoryRepository::new(pool.clone()),
            FeedbackRepository::new(pool),
            builtins,
        )
    }

    #[tokio::test]
    async fn manifest_filters_by_scope_but_keeps_builtins() {
        let pool = test_pool().await;
        let catalog = CatalogRepository::new(pool.clone());
        catalog.upsert_system(&sample_system("sys1")).await.unwrap();
        catalog.upsert_system(&sample_system("sys2")).await.unwrap();
        catalog
            .upsert_endpoint(&sample_endpoint("ep1", "sys1", RiskLevel::Read))
            .await
            .unwrap();
        catalog
            .upsert_endpoint(&sample_endpoint("ep2", "sys2", RiskLevel::Read))
            .await
            .unwrap();

        let enricher = build(pool).await;
        let mut session = UserSession::dev_user();
        session.permissions = vec!["crm:read".to_string()];
        session.access_scopes.systems = vec!["sys1".to_string()];

        let context = enricher
            .enrich(&session, "hello", &EnrichmentOptions::default())
            .await
            .unwrap();

        assert_eq!(context.catalog_tools.len(), 1);
        assert_eq!(context.catalog_tools[0].system_id, "sys1");
        let names = context.tool_names();
        assert!(names.contains(&"endpoint_ep1".to_string()));
        assert!(!names.contains(&"endpoint_ep2".to_string()));
        assert!(names.contains(&crate::tools::builtin::PLATFORM_STATUS.to_string()));
    }

    #[tokio::test]
    async fn knowledge_lands_in_the_prompt_context() {
        let pool = test_pool().await;
        let repository = KnowledgeRepository::new(pool.clone());
        let embedder = Arc::new(HashingEmbedder::default());
        let store = Arc::new(MemoryVectorStore::new());
        let indexer = KnowledgeIndexer::new(repository.clone(), embedder.clone(), store.clone());
        indexer
            .index_document(&crate::knowledge::KnowledgeDocument::new(
                "PTO Policy",
                "Employees accrue vacation days monthly",
            ))
            .await
            .unwrap();

        // The enricher must share the same retriever backing stores.
        let retriever = Arc::new(KnowledgeRetriever::new(repository, embedder, store));
        let builtins = Arc::new(BuiltinTools::new(
            MemoryRepository::new(pool.clone()),
            retriever.clone(),
            CatalogRepository::new(pool.clone()),
        ));
        let enricher = ContextEnricher::new(
            "Ember".to_string(),
            CatalogRepository::new(pool.clone()),
            CustomToolRepository::new(pool.clone()),
            retriever,
            MemoryRepository::new(pool.clone()),
            FeedbackRepository::new(pool),
            builtins,
        );

        let session = UserSession::dev_user();
        let context = enricher
            .enrich(&session, "vacation days", &EnrichmentOptions::default())
            .await
            .unwrap();
        assert!(context.prompt_context.knowledge_context.contains("PTO Policy"));
    }

    #[test]
    fn truncation_respects_char_budget() {
        let mut text = "x".repeat(100);
        truncate_chars(&mut text, 10);
        assert_eq!(text.len(), 10);
    }
}
