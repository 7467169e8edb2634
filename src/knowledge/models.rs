use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a knowledge document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Indexing,
    Published,
    Error,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Indexing => "indexing",
            Self::Published => "published",
            Self::Error => "error",
            Self::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Manual,
    Tutorial,
    ApiSpec,
    Faq,
    Policy,
    Reference,
    Changelog,
    Readme,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Tutorial => "tutorial",
            Self::ApiSpec => "api_spec",
            Self::Faq => "faq",
            Self::Policy => "policy",
            Self::Reference => "reference",
            Self::Changelog => "changelog",
            Self::Readme => "readme",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub workspace_ids: Vec<String>,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeDocument {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            document_type: DocumentType::Other,
            status: DocumentStatus::Draft,
            source: None,
            tags: Vec::new(),
            workspace_ids: Vec::new(),
            metadata: Value::Object(Default::default()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// A chunk of a document, created by the indexer and deleted with its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: Value,
}

/// One retrieval hit joined to its document title.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: DocumentChunk,
    pub score: f32,
    pub document_title: String,
}
