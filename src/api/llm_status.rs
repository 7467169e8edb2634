// Public LLM status: provider identity, active model, and a measured
// round-trip latency.

use axum::extract::State;
use axum::Json;

use super::state::AppState;
use super::ApiResult;
use crate::llm::{ChatMessage, CompletionRequest, LlmStatus};

/// GET /api/llm/status
pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<LlmStatus>> {
    let provider = &state.provider;

    let started = std::time::Instant::now();
    let probe = CompletionRequest::new(
        provider.default_model().to_string(),
        vec![ChatMessage::user("ping")],
    );
    let latency_ms = match provider.complete(probe).await {
        Ok(_) => Some(started.elapsed().as_millis() as u64),
        Err(e) => {
            tracing::debug!(error = %e, "llm status probe failed");
            None
        }
    };

    let fallback_models = state
        .routing_config
        .get_config()
        .await
        .map(|config| config.tier_mappings.values().cloned().collect())
        .unwrap_or_default();

    Ok(Json(LlmStatus {
        provider: provider.name().to_string(),
        provider_type: provider.provider_type().to_string(),
        active_model: provider.default_model().to_string(),
        latency_ms,
        fallback_models,
    }))
}
