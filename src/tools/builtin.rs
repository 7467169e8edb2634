// Built-in tools. Always present in the manifest irrespective of the user's
// catalog permissions.

use std::sync::Arc;

use schemars::schema_for;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::UserSession;
use crate::catalog::CatalogRepository;
use crate::error::{DeskError, Result};
use crate::knowledge::KnowledgeRetriever;
use crate::memory::{CreateMemory, MemoryCategory, MemoryRepository, MemorySource};
use crate::llm::ToolSpec;

pub const MEMORY_SAVE: &str = "save_memory";
pub const MEMORY_SEARCH: &str = "search_memories";
pub const KNOWLEDGE_SEARCH: &str = "search_knowledge";
pub const CATALOG_LIST: &str = "list_catalog_systems";
pub const PLATFORM_STATUS: &str = "platform_status";

#[derive(Debug, Deserialize, JsonSchema)]
struct SaveMemoryArgs {
    /// The fact to remember about the user.
    content: String,
    /// One of general, preference, fact, workflow.
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchMemoriesArgs {
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchKnowledgeArgs {
    query: String,
    /// Maximum number of chunks to return.
    #[serde(default)]
    top_k: Option<usize>,
}

pub struct BuiltinTools {
    memories: MemoryRepository,
    retriever: Arc<KnowledgeRetriever>,
    catalog: CatalogRepository,
    version: String,
}

impl BuiltinTools {
    pub fn new(
        memories: MemoryRepository,
        retriever: Arc<KnowledgeRetriever>,
        catalog: CatalogRepository,
    ) -> Self {
        Self {
            memories,
            retriever,
            catalog,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: MEMORY_SAVE.to_string(),
                description: "Save a durable memory about the user for future conversations."
                    .to_string(),
                parameters: schema_json::<SaveMemoryArgs>(),
            },
            ToolSpec {
                name: MEMORY_SEARCH.to_string(),
                description: "Search the user's saved memories by keywords.".to_string(),
                parameters: schema_json::<SearchMemoriesArgs>(),
            },
            ToolSpec {
                name: KNOWLEDGE_SEARCH.to_string(),
                description: "Semantic search over the knowledge base. Returns relevant excerpts with their source titles.".to_string(),
                parameters: schema_json::<SearchKnowledgeArgs>(),
            },
            ToolSpec {
                name: CATALOG_LIST.to_string(),
                description: "List the external systems available in the service catalog."
                    .to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolSpec {
                name: PLATFORM_STATUS.to_string(),
                description: "Report platform version and component status.".to_string(),
                parameters: json!({"type": "object", "properties": {}}),
            },
        ]
    }

    pub fn is_builtin(name: &str) -> bool {
        matches!(
            name,
            MEMORY_SAVE | MEMORY_SEARCH | KNOWLEDGE_SEARCH | CATALOG_LIST | PLATFORM_STATUS
        )
    }

    pub async fn execute(
        &self,
        name: &str,
        arguments: &Value,
        session: &UserSession,
    ) -> Result<Value> {
        match name {
            MEMORY_SAVE => {
                let args: SaveMemoryArgs = parse_args(name, arguments)?;
                let category = match args.category.as_deref() {
                    Some("preference") => MemoryCategory::Preference,
                    Some("fact") => MemoryCategory::Fact,
                    Some("workflow") => MemoryCategory::Workflow,
                    _ => MemoryCategory::General,
                };
                let memory = self
                    .memories
                    .create(
                        &session.user_id,
                        CreateMemory {
                            content: args.content,
                            category,
                            source: MemorySource::Agent,
                            metadata: None,
                        },
                    )
                    .await?;
                Ok(json!({"saved": true, "memory_id": memory.id}))
            }
            MEMORY_SEARCH => {
                let args: SearchMemoriesArgs = parse_args(name, arguments)?;
                let memories = self.memories.search(&session.user_id, &args.query).await?;
                Ok(json!({
                    "memories": memories
                        .iter()
                        .map(|m| json!({"content": m.content, "category": m.category}))
                        .collect::<Vec<_>>()
                }))
            }
            KNOWLEDGE_SEARCH => {
                let args: SearchKnowledgeArgs = parse_args(name, arguments)?;
                let results = self
                    .retriever
                    .retrieve(&args.query, args.top_k.unwrap_or(3))
                    .await?;
                Ok(json!({
                    "results": results
                        .iter()
                        .map(|r| json!({
                            "title": r.document_title,
                            "content": r.chunk.content,
                            "score": r.score,
                        }))
                        .collect::<Vec<_>>()
                }))
            }
            CATALOG_LIST => {
                let systems = self.catalog.list_systems().await?;
                Ok(json!({
                    "systems": systems
                        .iter()
                        .map(|s| json!({
                            "id": s.id,
                            "name": s.name,
                            "description": s.description,
                            "status": s.status,
                        }))
                        .collect::<Vec<_>>()
                }))
            }
            PLATFORM_STATUS => Ok(json!({
                "version": self.version,
                "status": "ok",
            })),
            other => Err(DeskError::tool(other, "unknown built-in tool")),
        }
    }
}

fn schema_json<T: JsonSchema>() -> Value {
    serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| json!({"type": "object"}))
}

fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| DeskError::tool(tool, format!("invalid arguments: {e}")))
}
