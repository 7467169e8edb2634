// Invoke a catalog endpoint: substitute path parameters, append query
// parameters, attach auth and SSO headers, send, and hand the response body
// back as the tool result.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::auth::sso_mapping::{SsoAttributeMapping, SsoMappingResolver};
use crate::auth::UserSession;
use crate::catalog::models::ExternalSystem;
use crate::error::{DeskError, Result};
use crate::tools::auth_resolver::AuthResolver;
use crate::tools::factory::ToolDefinition;

pub struct ToolInvoker {
    client: Client,
    auth_resolver: AuthResolver,
    sso_resolver: SsoMappingResolver,
    sso_mappings: Vec<SsoAttributeMapping>,
}

impl ToolInvoker {
    pub fn new(auth_resolver: AuthResolver, sso_mappings: Vec<SsoAttributeMapping>) -> Self {
        Self {
            client: Client::new(),
            auth_resolver,
            sso_resolver: SsoMappingResolver,
            sso_mappings,
        }
    }

    /// Substitute `{name}` placeholders in an endpoint path.
    pub fn substitute_path(path: &str, path_params: &Value) -> Result<String> {
        let mut result = path.to_string();
        if let Some(params) = path_params.as_object() {
            for (key, value) in params {
                let placeholder = format!("{{{key}}}");
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                result = result.replace(&placeholder, &rendered);
            }
        }
        if result.contains('{') {
            return Err(DeskError::Validation(format!(
                "unresolved path parameters in {result:?}"
            )));
        }
        Ok(result)
    }

    /// Execute one tool call. `arguments` is the model-provided object with
    /// optional `path`, `query`, and `body` sections.
    pub async fn invoke(
        &self,
        definition: &ToolDefinition,
        system: &ExternalSystem,
        session: &UserSession,
        arguments: &Value,
    ) -> Result<Value> {
        let empty = Value::Object(Default::default());
        let path_params = arguments.get("path").unwrap_or(&empty);
        let path = Self::substitute_path(&definition.path, path_params)?;
        let url = format!("{}{}", system.base_url.trim_end_matches('/'), path);

        let mut headers: HashMap<String, String> =
            self.auth_resolver.resolve_headers(system).await?;
        headers.extend(self.sso_resolver.resolve_headers(
            &self.sso_mappings,
            &session.raw_claims,
            Some(&system.id),
        ));

        let timeout = Duration::from_secs_f64(definition.timeout_seconds.max(1.0));
        let mut request = self
            .client
            .request(to_reqwest_method(definition), url.as_str())
            .timeout(timeout);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        if let Some(query) = arguments.get("query").and_then(Value::as_object) {
            let pairs: Vec<(String, String)> = query
                .iter()
                .map(|(k, v)| {
                    let rendered = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), rendered)
                })
                .collect();
            request = request.query(&pairs);
        }

        if definition.method.has_body() {
            let body = arguments.get("body").unwrap_or(&empty);
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            DeskError::tool(&definition.name, format!("request failed: {e}"))
        })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let body: Value =
            serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.clone()));

        if !status.is_success() {
            return Err(DeskError::tool(
                &definition.name,
                format!("endpoint returned {status}: {text}"),
            ));
        }
        Ok(serde_json::json!({
            "status": status.as_u16(),
            "body": body,
        }))
    }
}

fn to_reqwest_method(definition: &ToolDefinition) -> reqwest::Method {
    match definition.method {
        crate::catalog::models::HttpMethod::GET => reqwest::Method::GET,
        crate::catalog::models::HttpMethod::POST => reqwest::Method::POST,
        crate::catalog::models::HttpMethod::PUT => reqwest::Method::PUT,
        crate::catalog::models::HttpMethod::PATCH => reqwest::Method::PATCH,
        crate::catalog::models::HttpMethod::DELETE => reqwest::Method::DELETE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_substitution_fills_placeholders() {
        let path = ToolInvoker::substitute_path(
            "/customers/{id}/orders/{order_id}",
            &json!({"id": "c7", "order_id": 42}),
        )
        .unwrap();
        assert_eq!(path, "/customers/c7/orders/42");
    }

    #[test]
    fn unresolved_placeholder_is_rejected() {
        let err = ToolInvoker::substitute_path("/customers/{id}", &json!({})).unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }
}
