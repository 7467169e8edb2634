use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::error::DeskError;
use crate::workspaces::{CreateWorkspace, Workspace};

pub async fn list(
    State(state): State<AppState>,
    Session(_session): Session,
) -> ApiResult<Json<Vec<Workspace>>> {
    Ok(Json(state.workspaces.list().await.map_err(ApiError)?))
}

pub async fn create(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<CreateWorkspace>,
) -> ApiResult<Json<Workspace>> {
    require_permission(&session, "workspaces:write")?;
    if request.name.trim().is_empty() {
        return Err(ApiError(DeskError::Validation("name must not be empty".into())));
    }
    Ok(Json(state.workspaces.create(request).await.map_err(ApiError)?))
}

pub async fn delete(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "workspaces:write")?;
    if !state.workspaces.delete(&id).await.map_err(ApiError)? {
        return Err(ApiError(DeskError::NotFound(format!("workspace {id}"))));
    }
    Ok(Json(json!({"status": "deleted"})))
}
