// Central configuration, read from FLYDESK_-prefixed environment variables.
// In dev mode the app runs against SQLite with a bypassed auth layer and no
// OIDC settings required.

use std::env;

use crate::error::{DeskError, Result};

/// Supported vector store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorStoreKind {
    PgVector,
    ChromaDb,
    Pinecone,
    Sqlite,
    Memory,
}

impl VectorStoreKind {
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "pgvector" => Ok(Self::PgVector),
            "chromadb" => Ok(Self::ChromaDb),
            "pinecone" => Ok(Self::Pinecone),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(DeskError::Configuration(format!(
                "unknown vector store backend: {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PgVector => "pgvector",
            Self::ChromaDb => "chromadb",
            Self::Pinecone => "pinecone",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// OIDC settings, required only when dev_mode is off.
#[derive(Debug, Clone, Default)]
pub struct OidcConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub roles_claim: String,
    pub permissions_claim: String,
    pub provider_type: String,
}

#[derive(Debug, Clone)]
pub struct DeskConfig {
    pub dev_mode: bool,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub oidc: OidcConfig,
    pub cors_origins: Vec<String>,

    pub agent_name: String,
    pub max_turns_per_conversation: u32,
    pub max_tools_per_turn: u32,

    /// OpenAI-compatible chat endpoint for the active provider.
    pub llm_base_url: String,
    pub llm_api_key: String,
    pub llm_model: String,

    /// `provider:model`, e.g. `openai:text-embedding-3-small`.
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub embedding_api_key: String,
    pub embedding_base_url: String,
    pub rag_top_k: usize,

    pub vector_store: VectorStoreKind,
    pub chroma_url: String,
    pub pinecone_api_key: String,
    pub pinecone_index: String,

    pub credential_encryption_key: String,
    pub audit_retention_days: u32,
    pub rate_limit_per_user: u32,

    pub file_storage_path: String,
    pub file_max_size_mb: u64,
}

fn var(name: &str) -> Option<String> {
    env::var(format!("FLYDESK_{name}")).ok().filter(|v| !v.is_empty())
}

fn var_or(name: &str, default: &str) -> String {
    var(name).unwrap_or_else(|| default.to_string())
}

fn parse_num<T: std::str::FromStr>(name: &str, raw: String) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        DeskError::Configuration(format!("FLYDESK_{name} is not a valid number: {raw:?}"))
    })
}

fn csv(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl DeskConfig {
    /// Load configuration from the environment, failing fast on invalid values.
    pub fn from_env() -> Result<Self> {
        let dev_mode = var("DEV_MODE").map(|v| v == "true" || v == "1").unwrap_or(true);

        let database_url = var_or("DATABASE_URL", "sqlite::memory:");
        if !dev_mode && database_url.starts_with("sqlite") {
            tracing::warn!("running production mode against SQLite");
        }

        let oidc = OidcConfig {
            issuer_url: var_or("OIDC_ISSUER_URL", ""),
            client_id: var_or("OIDC_CLIENT_ID", ""),
            client_secret: var_or("OIDC_CLIENT_SECRET", ""),
            scopes: csv(var_or("OIDC_SCOPES", "openid,profile,email,roles")),
            redirect_uri: var_or("OIDC_REDIRECT_URI", "http://localhost:3000/auth/callback"),
            roles_claim: var_or("OIDC_ROLES_CLAIM", "roles"),
            permissions_claim: var_or("OIDC_PERMISSIONS_CLAIM", "permissions"),
            provider_type: var_or("OIDC_PROVIDER_TYPE", "keycloak"),
        };
        if !dev_mode && oidc.issuer_url.is_empty() {
            return Err(DeskError::Configuration(
                "FLYDESK_OIDC_ISSUER_URL is required when dev mode is off".into(),
            ));
        }

        let vector_store = VectorStoreKind::parse(&var_or("VECTOR_STORE", "memory"))?;

        Ok(Self {
            dev_mode,
            database_url,
            redis_url: var("REDIS_URL"),
            oidc,
            cors_origins: csv(var_or(
                "CORS_ORIGINS",
                "http://localhost:3000,http://localhost:5173",
            )),
            agent_name: var_or("AGENT_NAME", "Ember"),
            max_turns_per_conversation: parse_num(
                "MAX_TURNS_PER_CONVERSATION",
                var_or("MAX_TURNS_PER_CONVERSATION", "200"),
            )?,
            max_tools_per_turn: parse_num("MAX_TOOLS_PER_TURN", var_or("MAX_TOOLS_PER_TURN", "10"))?,
            llm_base_url: var_or("LLM_BASE_URL", "https://api.openai.com/v1"),
            llm_api_key: var_or("LLM_API_KEY", ""),
            llm_model: var_or("LLM_MODEL", "gpt-4o-mini"),
            embedding_model: var_or("EMBEDDING_MODEL", "openai:text-embedding-3-small"),
            embedding_dimensions: parse_num(
                "EMBEDDING_DIMENSIONS",
                var_or("EMBEDDING_DIMENSIONS", "1536"),
            )?,
            embedding_api_key: var_or("EMBEDDING_API_KEY", ""),
            embedding_base_url: var_or("EMBEDDING_BASE_URL", "https://api.openai.com/v1"),
            rag_top_k: parse_num("RAG_TOP_K", var_or("RAG_TOP_K", "3"))?,
            vector_store,
            chroma_url: var_or("CHROMA_URL", "http://localhost:8000"),
            pinecone_api_key: var_or("PINECONE_API_KEY", ""),
            pinecone_index: var_or("PINECONE_INDEX", "flydesk"),
            credential_encryption_key: var_or("CREDENTIAL_ENCRYPTION_KEY", ""),
            audit_retention_days: parse_num(
                "AUDIT_RETENTION_DAYS",
                var_or("AUDIT_RETENTION_DAYS", "365"),
            )?,
            rate_limit_per_user: parse_num(
                "RATE_LIMIT_PER_USER",
                var_or("RATE_LIMIT_PER_USER", "60"),
            )?,
            file_storage_path: var_or("FILE_STORAGE_PATH", "./uploads"),
            file_max_size_mb: parse_num("FILE_MAX_SIZE_MB", var_or("FILE_MAX_SIZE_MB", "50"))?,
        })
    }

    /// Split `embedding_model` into `(provider, model)`.
    pub fn embedding_provider_model(&self) -> (String, String) {
        match self.embedding_model.split_once(':') {
            Some((p, m)) => (p.to_string(), m.to_string()),
            None => ("openai".to_string(), self.embedding_model.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_store_tags_round_trip() {
        for tag in ["pgvector", "chromadb", "pinecone", "sqlite", "memory"] {
            assert_eq!(VectorStoreKind::parse(tag).unwrap().as_str(), tag);
        }
        assert!(VectorStoreKind::parse("faiss").is_err());
    }

    #[test]
    fn embedding_model_splits_provider() {
        let mut config = DeskConfig::from_env().unwrap();
        config.embedding_model = "gemini:gemini-embedding-001".to_string();
        let (provider, model) = config.embedding_provider_model();
        assert_eq!(provider, "gemini");
        assert_eq!(model, "gemini-embedding-001");
    }
}
