use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::channels::EMAIL_PROVIDERS;
use crate::error::DeskError;

/// POST /api/email/inbound/{provider}. Provider webhooks are accepted with
/// 202 after normalisation; unknown providers are a 400.
pub async fn inbound(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Option<Json<Value>>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if !EMAIL_PROVIDERS.contains(&provider.as_str()) {
        return Err(ApiError(DeskError::Validation(format!(
            "unknown email provider: {provider}"
        ))));
    }

    let adapter = state
        .channels
        .get("email")
        .ok_or_else(|| ApiError(DeskError::NotFound("email channel not registered".into())))?;
    let payload = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    let message = adapter
        .receive(json!({"provider": provider, "payload": payload}))
        .await
        .map_err(ApiError)?;
    tracing::info!(
        provider,
        from = %message.user_id,
        bytes = message.content.len(),
        "received inbound email"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "provider": provider})),
    ))
}
