// Authentication and access control models. OIDC login flows live outside
// this crate; every request carries a hydrated UserSession.

pub mod sso_mapping;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource-level access rules attached to a role. An empty list means
/// unrestricted, preserving compatibility with roles that predate scoping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessScopes {
    #[serde(default)]
    pub systems: Vec<String>,
    #[serde(default)]
    pub knowledge_tags: Vec<String>,
    #[serde(default)]
    pub skill_tags: Vec<String>,
}

impl AccessScopes {
    pub fn can_access_system(&self, system_id: &str) -> bool {
        self.systems.is_empty() || self.systems.iter().any(|s| s == system_id)
    }

    pub fn can_access_knowledge(&self, doc_tags: &[String]) -> bool {
        self.knowledge_tags.is_empty()
            || doc_tags.iter().any(|t| self.knowledge_tags.contains(t))
    }

    pub fn can_access_skill(&self, skill_tags: &[String]) -> bool {
        self.skill_tags.is_empty() || skill_tags.iter().any(|t| self.skill_tags.contains(t))
    }
}

/// Hydrated from the OIDC token on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub access_scopes: AccessScopes,
    pub tenant_id: Option<String>,
    pub department: Option<String>,
    pub title: Option<String>,
    pub session_id: String,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub raw_claims: Value,
}

impl UserSession {
    /// `"*"` grants all permissions (superuser / admin).
    pub fn is_admin(&self) -> bool {
        self.permissions.iter().any(|p| p == "*")
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_admin() || self.permissions.iter().any(|p| p == permission)
    }

    /// Static session used in dev mode, where auth is bypassed.
    pub fn dev_user() -> Self {
        Self {
            user_id: "dev-user".to_string(),
            email: "dev@flydesk.local".to_string(),
            display_name: "Dev User".to_string(),
            roles: vec!["admin".to_string()],
            permissions: vec!["*".to_string()],
            access_scopes: AccessScopes::default(),
            tenant_id: None,
            department: None,
            title: None,
            session_id: uuid::Uuid::new_v4().to_string(),
            token_expires_at: None,
            raw_claims: Value::Object(Default::default()),
        }
    }
}
