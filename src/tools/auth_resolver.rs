// Resolve authentication headers for external system calls.

use std::collections::HashMap;

use crate::catalog::credentials::CredentialStore;
use crate::catalog::models::{AuthType, ExternalSystem};
use crate::error::{DeskError, Result};

/// Builds the auth headers for a given external system.
///
/// Supported auth types:
/// - bearer: `Authorization: Bearer <token>`
/// - api_key: custom header named by the system's auth config
/// - basic: `Authorization: Basic <token>` (stored value is pre-encoded)
/// - oauth2: stored token sent as a bearer header; a per-system refresh flow
///   can replace this without touching callers
pub struct AuthResolver {
    credentials: CredentialStore,
}

impl AuthResolver {
    pub fn new(credentials: CredentialStore) -> Self {
        Self { credentials }
    }

    pub async fn resolve_headers(&self, system: &ExternalSystem) -> Result<HashMap<String, String>> {
        let auth_config = &system.auth_config;
        if auth_config.auth_type == AuthType::None {
            return Ok(HashMap::new());
        }

        let token = self
            .credentials
            .get_token(&auth_config.credential_id)
            .await?
            .ok_or_else(|| {
                DeskError::NotFound(format!(
                    "credential {} for system {}",
                    auth_config.credential_id, system.id
                ))
            })?;

        let mut headers = HashMap::new();
        match auth_config.auth_type {
            AuthType::Bearer => {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            AuthType::ApiKey => {
                let header_name = auth_config
                    .auth_headers
                    .as_ref()
                    .and_then(|h| h.keys().next().cloned())
                    .unwrap_or_else(|| "X-Api-Key".to_string());
                headers.insert(header_name, token);
            }
            AuthType::Basic => {
                headers.insert("Authorization".to_string(), format!("Basic {token}"));
            }
            AuthType::Oauth2 => {
                tracing::debug!(system_id = %system.id, "oauth2 auth, using stored token as bearer");
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            AuthType::MutualTls => {
                tracing::warn!(
                    system_id = %system.id,
                    "mutual_tls auth is not supported at the header level"
                );
            }
            AuthType::None => unreachable!(),
        }
        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::models::{AuthConfig, SystemStatus};
    use crate::db::test_pool;
    use std::collections::BTreeMap;

    async fn setup(auth_type: AuthType, auth_headers: Option<BTreeMap<String, String>>) -> (AuthResolver, ExternalSystem) {
        let store = CredentialStore::new(test_pool().await, "key").unwrap();
        let credential = store.store("sys1", "token", "tok-123", None).await.unwrap();
        let system = ExternalSystem {
            id: "sys1".to_string(),
            name: "CRM".to_string(),
            description: String::new(),
            base_url: "https://crm.example.com".to_string(),
            auth_config: AuthConfig {
                auth_type,
                credential_id: credential.id,
                token_url: None,
                scopes: None,
                auth_headers,
            },
            health_check_path: None,
            tags: Vec::new(),
            status: SystemStatus::Active,
            metadata: serde_json::Value::Null,
        };
        (AuthResolver::new(store), system)
    }

    #[tokio::test]
    async fn bearer_header() {
        let (resolver, system) = setup(AuthType::Bearer, None).await;
        let headers = resolver.resolve_headers(&system).await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer tok-123");
    }

    #[tokio::test]
    async fn api_key_uses_configured_header() {
        let mut named = BTreeMap::new();
        named.insert("X-Custom-Key".to_string(), String::new());
        let (resolver, system) = setup(AuthType::ApiKey, Some(named)).await;
        let headers = resolver.resolve_headers(&system).await.unwrap();
        assert_eq!(headers["X-Custom-Key"], "tok-123");
    }

    #[tokio::test]
    async fn oauth2_falls_back_to_bearer() {
        let (resolver, system) = setup(AuthType::Oauth2, None).await;
        let headers = resolver.resolve_headers(&system).await.unwrap();
        assert_eq!(headers["Authorization"], "Bearer tok-123");
    }

    #[tokio::test]
    async fn missing_credential_is_an_error() {
        let (resolver, mut system) = setup(AuthType::Bearer, None).await;
        system.auth_config.credential_id = "missing".to_string();
        let err = resolver.resolve_headers(&system).await.unwrap_err();
        assert!(matches!(err, DeskError::NotFound(_)));
    }
}
