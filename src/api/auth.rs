// Session extraction. Dev mode bypasses auth with a static superuser;
// production expects the OIDC middleware upstream to have validated the
// bearer token and forwarded its claims.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::state::AppState;
use super::ApiError;
use crate::auth::UserSession;
use crate::error::DeskError;

pub struct Session(pub UserSession);

#[axum::async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.config.dev_mode {
            return Ok(Session(UserSession::dev_user()));
        }

        // Behind the OIDC proxy the validated claims arrive as a JSON header.
        let raw = parts
            .headers
            .get("x-flydesk-claims")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError(DeskError::Unauthorized))?;
        let claims: serde_json::Value =
            serde_json::from_str(raw).map_err(|_| ApiError(DeskError::Unauthorized))?;

        let as_list = |value: &serde_json::Value| -> Vec<String> {
            match value {
                serde_json::Value::Array(items) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect(),
                serde_json::Value::String(s) => vec![s.clone()],
                _ => Vec::new(),
            }
        };

        let oidc = &state.config.oidc;
        let session = UserSession {
            user_id: claims["sub"].as_str().unwrap_or_default().to_string(),
            email: claims["email"].as_str().unwrap_or_default().to_string(),
            display_name: claims["name"]
                .as_str()
                .or_else(|| claims["email"].as_str())
                .unwrap_or_default()
                .to_string(),
            roles: as_list(&claims[oidc.roles_claim.as_str()]),
            permissions: as_list(&claims[oidc.permissions_claim.as_str()]),
            access_scopes: Default::default(),
            tenant_id: claims["tenant_id"].as_str().map(str::to_string),
            department: claims["department"].as_str().map(str::to_string),
            title: claims["title"].as_str().map(str::to_string),
            session_id: uuid::Uuid::new_v4().to_string(),
            token_expires_at: None,
            raw_claims: claims,
        };
        if session.user_id.is_empty() {
            return Err(ApiError(DeskError::Unauthorized));
        }
        Ok(Session(session))
    }
}

/// Guard helper: 403 unless the session holds `permission`.
pub fn require_permission(session: &UserSession, permission: &str) -> Result<(), ApiError> {
    if session.has_permission(permission) {
        Ok(())
    } else {
        Err(ApiError(DeskError::Forbidden(format!(
            "missing permission {permission}"
        ))))
    }
}
