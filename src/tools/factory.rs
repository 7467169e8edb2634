// Generate agent tools from Service Catalog entries, filtered by the
// caller's permissions and access scopes.

use serde_json::{json, Value};

use crate::auth::AccessScopes;
use crate::catalog::models::{HttpMethod, RiskLevel, ServiceEndpoint};
use crate::llm::ToolSpec;

/// A tool descriptor ready to be registered with the agent.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub endpoint_id: String,
    pub name: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub system_id: String,
    pub method: HttpMethod,
    pub path: String,
    pub parameters: Value,
    pub timeout_seconds: f64,
}

impl ToolDefinition {
    pub fn requires_confirmation(&self) -> bool {
        self.risk_level.requires_confirmation()
    }

    /// Manifest entry presented to the LLM.
    pub fn to_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ToolFactory;

impl ToolFactory {
    /// Build tools the user is permitted to use.
    ///
    /// When `access_scopes` is provided, endpoints are additionally filtered
    /// so only tools belonging to allowed systems are included. Admin users
    /// (wildcard permission) bypass scope checks.
    pub fn build_tool_definitions(
        &self,
        endpoints: &[ServiceEndpoint],
        user_permissions: &[String],
        access_scopes: Option<&AccessScopes>,
    ) -> Vec<ToolDefinition> {
        let is_admin = user_permissions.iter().any(|p| p == "*");
        endpoints
            .iter()
            .filter(|ep| Self::has_permission(user_permissions, &ep.required_permissions))
            .filter(|ep| {
                is_admin
                    || access_scopes
                        .map(|scopes| scopes.can_access_system(&ep.system_id))
                        .unwrap_or(true)
            })
            .map(Self::to_definition)
            .collect()
    }

    /// The user must hold ALL required permissions. `"*"` grants everything.
    fn has_permission(user_permissions: &[String], required_permissions: &[String]) -> bool {
        if user_permissions.iter().any(|p| p == "*") {
            return true;
        }
        required_permissions
            .iter()
            .all(|required| user_permissions.contains(required))
    }

    fn to_definition(endpoint: &ServiceEndpoint) -> ToolDefinition {
        let mut description = endpoint.description.clone();
        if !endpoint.when_to_use.is_empty() {
            description.push_str(&format!("\n\nWhen to use: {}", endpoint.when_to_use));
        }
        if !endpoint.examples.is_empty() {
            description.push_str(&format!("\n\nExamples: {}", endpoint.examples.join(", ")));
        }

        let mut parameters = serde_json::Map::new();
        if let Some(path_params) = &endpoint.path_params {
            parameters.insert("path".to_string(), json!(path_params));
        }
        if let Some(query_params) = &endpoint.query_params {
            parameters.insert("query".to_string(), json!(query_params));
        }
        if let Some(body) = &endpoint.request_body {
            parameters.insert("body".to_string(), body.clone());
        }

        ToolDefinition {
            endpoint_id: endpoint.id.clone(),
            name: endpoint.name.clone(),
            description,
            risk_level: endpoint.risk_level,
            system_id: endpoint.system_id.clone(),
            method: endpoint.method,
            path: endpoint.path.clone(),
            parameters: Value::Object(parameters),
            timeout_seconds: endpoint.timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(id: &str, system_id: &str, permissions: &[&str]) -> ServiceEndpoint {
        ServiceEndpoint {
            id: id.to_string(),
            system_id: system_id.to_string(),
            name: format!("tool_{id}"),
            description: "desc".to_string(),
            method: HttpMethod::GET,
            path: "/x".to_string(),
            path_params: None,
            query_params: None,
            request_body: None,
            when_to_use: "whenever".to_string(),
            examples: vec!["example one".to_string()],
            risk_level: RiskLevel::Read,
            required_permissions: permissions.iter().map(|p| p.to_string()).collect(),
            timeout_seconds: 30.0,
            enabled: true,
            tags: Vec::new(),
        }
    }

    fn perms(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn filters_by_required_permissions() {
        let factory = ToolFactory;
        let endpoints = vec![
            endpoint("a", "sys1", &["crm:read"]),
            endpoint("b", "sys1", &["crm:read", "crm:write"]),
        ];

        let tools =
            factory.build_tool_definitions(&endpoints, &perms(&["crm:read"]), None);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].endpoint_id, "a");
    }

    #[test]
    fn wildcard_grants_everything() {
        let factory = ToolFactory;
        let endpoints = vec![endpoint("a", "sys1", &["crm:read", "crm:write"])];
        let tools = factory.build_tool_definitions(&endpoints, &perms(&["*"]), None);
        assert_eq!(tools.len(), 1);
    }

    #[test]
    fn scopes_restrict_to_allowed_systems() {
        let factory = ToolFactory;
        let endpoints = vec![
            endpoint("a", "sys1", &["crm:read"]),
            endpoint("b", "sys2", &["crm:read"]),
        ];
        let scopes = AccessScopes {
            systems: vec!["sys1".to_string()],
            ..Default::default()
        };

        let tools =
            factory.build_tool_definitions(&endpoints, &perms(&["crm:read"]), Some(&scopes));
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].system_id, "sys1");

        // Admins bypass scope checks.
        let admin_tools = factory.build_tool_definitions(&endpoints, &perms(&["*"]), Some(&scopes));
        assert_eq!(admin_tools.len(), 2);
    }

    #[test]
    fn description_includes_usage_hints() {
        let factory = ToolFactory;
        let endpoints = vec![endpoint("a", "sys1", &[])];
        let tools = factory.build_tool_definitions(&endpoints, &perms(&[]), None);
        let description = &tools[0].description;
        assert!(description.contains("When to use: whenever"));
        assert!(description.contains("Examples: example one"));
    }

    #[test]
    fn confirmation_required_for_high_risk() {
        let mut ep = endpoint("a", "sys1", &[]);
        ep.risk_level = RiskLevel::Destructive;
        let factory = ToolFactory;
        let tools = factory.build_tool_definitions(&[ep], &perms(&["*"]), None);
        assert!(tools[0].requires_confirmation());
    }
}
