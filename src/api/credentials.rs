use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::error::DeskError;

#[derive(Debug, Deserialize)]
pub struct CreateCredentialRequest {
    pub system_id: String,
    pub name: String,
    /// Plaintext secret; encrypted before it reaches the database and never
    /// returned by any endpoint.
    pub value: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub async fn create(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<CreateCredentialRequest>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "catalog:write")?;
    if request.value.is_empty() {
        return Err(ApiError(DeskError::Validation("value must not be empty".into())));
    }
    let credential = state
        .credentials
        .store(&request.system_id, &request.name, &request.value, request.expires_at)
        .await
        .map_err(ApiError)?;
    Ok(Json(json!({
        "id": credential.id,
        "system_id": credential.system_id,
        "name": credential.name,
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "catalog:write")?;
    if !state.credentials.delete(&id).await.map_err(ApiError)? {
        return Err(ApiError(DeskError::NotFound(format!("credential {id}"))));
    }
    Ok(Json(json!({"status": "deleted"})))
}
