use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::audit::AuditEvent;
use crate::error::DeskError;

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// GET /api/audit/events. `limit` is capped at 500.
pub async fn list(
    State(state): State<AppState>,
    Session(session): Session,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditEvent>>> {
    require_permission(&session, "audit:read")?;
    if query.limit == 0 {
        return Err(ApiError(DeskError::Validation("limit must be positive".into())));
    }
    Ok(Json(
        state.audit.list_recent(query.limit).await.map_err(ApiError)?,
    ))
}
