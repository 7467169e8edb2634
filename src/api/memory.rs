use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::auth::Session;
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::error::DeskError;
use crate::memory::{CreateMemory, UpdateMemory, UserMemory};

pub async fn list(
    State(state): State<AppState>,
    Session(session): Session,
) -> ApiResult<Json<Vec<UserMemory>>> {
    Ok(Json(
        state
            .memories
            .list_for_user(&session.user_id, None)
            .await
            .map_err(ApiError)?,
    ))
}

pub async fn create(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<CreateMemory>,
) -> ApiResult<Json<UserMemory>> {
    Ok(Json(
        state
            .memories
            .create(&session.user_id, request)
            .await
            .map_err(ApiError)?,
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
    Json(request): Json<UpdateMemory>,
) -> ApiResult<Json<UserMemory>> {
    state
        .memories
        .update(&session.user_id, &id, request)
        .await
        .map_err(ApiError)?
        .map(Json)
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("memory {id}"))))
}

pub async fn delete(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state
        .memories
        .delete(&session.user_id, &id)
        .await
        .map_err(ApiError)?
    {
        return Err(ApiError(DeskError::NotFound(format!("memory {id}"))));
    }
    Ok(Json(json!({"status": "deleted"})))
}
