// Unified error type for the Firefly Desk backend.
// Recoverable tool/embedding failures are reported in-band; everything here
// surfaces at an operation boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeskError {
    /// Invalid or missing configuration at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No authenticated session.
    #[error("unauthorized")]
    Unauthorized,

    /// Session present but permission or scope missing.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Unknown id, webhook token, or slug.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed body or out-of-range input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Per-user request budget exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Embedding generation failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// LLM provider transport or protocol failure.
    #[error("provider error: {0}")]
    Provider(String),

    /// A tool call failed during agent execution.
    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    /// Sandbox subprocess failure (timeout, non-zero exit, bad output).
    #[error("sandbox error: {0}")]
    Sandbox(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Vector store backend failure.
    #[error("vector store error: {0}")]
    VectorStore(String),
}

impl DeskError {
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for DeskError {
    fn from(e: reqwest::Error) -> Self {
        Self::Provider(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeskError>;
