// Inbound workflow webhooks and workflow status queries.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use super::auth::Session;
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::error::DeskError;
use crate::workflows::engine::WorkflowStatusSummary;
use crate::workflows::models::{Trigger, TriggerType, WebhookStatus};

/// POST /api/webhooks/{token}. Unauthenticated by design; the token is the
/// credential. Unknown or already-consumed tokens return 404.
pub async fn receive(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let registration = state
        .workflow_repo
        .get_webhook_by_token(&token)
        .await
        .map_err(ApiError)?
        .filter(|r| r.status == WebhookStatus::Active)
        .ok_or_else(|| ApiError(DeskError::NotFound("webhook not found or expired".into())))?;

    // First consumer wins; losers see the registration as already consumed.
    let consumed = state
        .workflow_repo
        .consume_webhook(&registration.id)
        .await
        .map_err(ApiError)?;
    if !consumed {
        return Err(ApiError(DeskError::NotFound(
            "webhook not found or expired".into(),
        )));
    }

    let payload = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let trigger = Trigger {
        trigger_type: TriggerType::Webhook,
        step_index: Some(registration.step_index),
        payload,
    };
    state
        .workflow_engine
        .resume(&registration.workflow_id, trigger)
        .await
        .map_err(ApiError)?;

    Ok(Json(json!({"status": "accepted"})))
}

/// GET /api/workflows/{id}/status
pub async fn workflow_status(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<WorkflowStatusSummary>> {
    let workflow = state
        .workflow_repo
        .get(&id)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("workflow {id}"))))?;
    if workflow.user_id != session.user_id && !session.is_admin() {
        return Err(ApiError(DeskError::Forbidden("not your workflow".into())));
    }
    let summary = state
        .workflow_engine
        .get_status(&id)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("workflow {id}"))))?;
    Ok(Json(summary))
}

/// POST /api/workflows/{id}/cancel
pub async fn cancel_workflow(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let workflow = state
        .workflow_repo
        .get(&id)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("workflow {id}"))))?;
    if workflow.user_id != session.user_id && !session.is_admin() {
        return Err(ApiError(DeskError::Forbidden("not your workflow".into())));
    }
    state.workflow_engine.cancel(&id).await.map_err(ApiError)?;
    Ok(Json(json!({"status": "cancelled"})))
}
