// Service catalog: external systems and the endpoints the agent may call.

pub mod credentials;
pub mod models;
pub mod repository;

pub use credentials::CredentialStore;
pub use models::{
    AuthConfig, AuthType, Credential, ExternalSystem, HttpMethod, ParamSchema, ProtocolType,
    RiskLevel, ServiceEndpoint, SystemStatus,
};
pub use repository::CatalogRepository;
