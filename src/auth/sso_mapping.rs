// SSO attribute mapping. When the agent calls backoffice APIs on behalf of a
// user, SSO claims such as employee_id are forwarded as HTTP headers so the
// downstream system recognises the originating user.

use std::collections::HashMap;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingTarget {
    Header,
    QueryParam,
}

/// A single mapping from an SSO claim to an outbound HTTP header or query param.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsoAttributeMapping {
    pub id: String,
    /// Dot-notation path into the raw claims object, e.g. `"employee_id"` or
    /// `"custom_claims.hr_id"`.
    pub claim_path: String,
    pub target_header: String,
    #[serde(default = "default_target")]
    pub target_type: MappingTarget,
    /// When set, this mapping only applies to calls targeting the given system.
    pub system_filter: Option<String>,
    /// `uppercase`, `lowercase`, `prefix:X`, `base64`, or none for pass-through.
    pub transform: Option<String>,
}

fn default_target() -> MappingTarget {
    MappingTarget::Header
}

fn extract_claim(raw_claims: &Value, claim_path: &str) -> Option<String> {
    let mut current = raw_claims;
    for part in claim_path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn apply_transform(value: String, transform: Option<&str>) -> String {
    match transform {
        None => value,
        Some("uppercase") => value.to_uppercase(),
        Some("lowercase") => value.to_lowercase(),
        Some("base64") => base64::engine::general_purpose::STANDARD.encode(value.as_bytes()),
        Some(t) if t.starts_with("prefix:") => {
            format!("{}{value}", &t["prefix:".len()..])
        }
        Some(other) => {
            tracing::warn!(transform = other, "unknown SSO mapping transform, passing through");
            value
        }
    }
}

/// Resolves SSO claim values into HTTP headers for API calls.
#[derive(Debug, Default)]
pub struct SsoMappingResolver;

impl SsoMappingResolver {
    /// Apply `mappings` against `raw_claims`, returning a header map.
    ///
    /// Mappings with a non-matching `system_filter`, a missing claim, or a
    /// query-param target are skipped. Query params are handled at the
    /// request builder level.
    pub fn resolve_headers(
        &self,
        mappings: &[SsoAttributeMapping],
        raw_claims: &Value,
        system_id: Option<&str>,
    ) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        for mapping in mappings {
            if let Some(filter) = &mapping.system_filter {
                if system_id != Some(filter.as_str()) {
                    continue;
                }
            }

            let Some(value) = extract_claim(raw_claims, &mapping.claim_path) else {
                tracing::debug!(
                    claim_path = %mapping.claim_path,
                    mapping_id = %mapping.id,
                    "SSO claim not found, skipping mapping"
                );
                continue;
            };

            let value = apply_transform(value, mapping.transform.as_deref());

            if mapping.target_type == MappingTarget::Header {
                headers.insert(mapping.target_header.clone(), value);
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mapping(claim_path: &str, header: &str, transform: Option<&str>) -> SsoAttributeMapping {
        SsoAttributeMapping {
            id: "m1".to_string(),
            claim_path: claim_path.to_string(),
            target_header: header.to_string(),
            target_type: MappingTarget::Header,
            system_filter: None,
            transform: transform.map(str::to_string),
        }
    }

    #[test]
    fn resolves_dot_notation_claims() {
        let resolver = SsoMappingResolver;
        let claims = json!({"custom_claims": {"hr_id": "e-42"}});
        let headers = resolver.resolve_headers(
            &[mapping("custom_claims.hr_id", "X-HR-ID", None)],
            &claims,
            None,
        );
        assert_eq!(headers.get("X-HR-ID").map(String::as_str), Some("e-42"));
    }

    #[test]
    fn applies_transforms() {
        let resolver = SsoMappingResolver;
        let claims = json!({"employee_id": "ab12"});

        let upper = resolver.resolve_headers(
            &[mapping("employee_id", "X-Emp", Some("uppercase"))],
            &claims,
            None,
        );
        assert_eq!(upper["X-Emp"], "AB12");

        let prefixed = resolver.resolve_headers(
            &[mapping("employee_id", "X-Emp", Some("prefix:EMP-"))],
            &claims,
            None,
        );
        assert_eq!(prefixed["X-Emp"], "EMP-ab12");

        let encoded = resolver.resolve_headers(
            &[mapping("employee_id", "X-Emp", Some("base64"))],
            &claims,
            None,
        );
        assert_eq!(encoded["X-Emp"], "YWIxMg==");
    }

    #[test]
    fn system_filter_skips_other_systems() {
        let resolver = SsoMappingResolver;
        let claims = json!({"employee_id": "42"});
        let mut m = mapping("employee_id", "X-Emp", None);
        m.system_filter = Some("hr-system".to_string());

        let matched = resolver.resolve_headers(&[m.clone()], &claims, Some("hr-system"));
        assert_eq!(matched.len(), 1);

        let skipped = resolver.resolve_headers(&[m], &claims, Some("crm"));
        assert!(skipped.is_empty());
    }

    #[test]
    fn missing_claim_is_skipped() {
        let resolver = SsoMappingResolver;
        let headers =
            resolver.resolve_headers(&[mapping("absent.claim", "X-A", None)], &json!({}), None);
        assert!(headers.is_empty());
    }
}
