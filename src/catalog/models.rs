use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Draft,
    Active,
    Disabled,
    Deprecated,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    None,
    Oauth2,
    ApiKey,
    Basic,
    Bearer,
    MutualTls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
        }
    }

    /// Write methods carry a JSON body.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::POST | Self::PUT | Self::PATCH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Read,
    LowWrite,
    HighWrite,
    Destructive,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::LowWrite => "low_write",
            Self::HighWrite => "high_write",
            Self::Destructive => "destructive",
        }
    }

    /// High-risk calls must be confirmed by the user before execution.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Self::HighWrite | Self::Destructive)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    Rest,
    Graphql,
    Soap,
    Grpc,
}

impl Default for ProtocolType {
    fn default() -> Self {
        Self::Rest
    }
}

/// Schema for a single API parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default, rename = "enum")]
    pub allowed_values: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// Authentication configuration for an external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub auth_type: AuthType,
    pub credential_id: String,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// For api_key auth the first key names the header to set.
    #[serde(default)]
    pub auth_headers: Option<BTreeMap<String, String>>,
}

/// A backend system the agent can interact with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalSystem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_url: String,
    pub auth_config: AuthConfig,
    #[serde(default)]
    pub health_check_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub status: SystemStatus,
    #[serde(default)]
    pub metadata: Value,
}

/// A single operation the agent can perform on an external system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub id: String,
    pub system_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub path_params: Option<BTreeMap<String, ParamSchema>>,
    #[serde(default)]
    pub query_params: Option<BTreeMap<String, ParamSchema>>,
    #[serde(default)]
    pub request_body: Option<Value>,
    #[serde(default)]
    pub when_to_use: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub required_permissions: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_timeout() -> f64 {
    30.0
}

/// Encrypted credential for system authentication. Plaintext is write-only;
/// the value at rest is always ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    pub system_id: String,
    pub name: String,
    pub encrypted_value: String,
    pub credential_type: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_rotated: Option<DateTime<Utc>>,
}
