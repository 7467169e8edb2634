// HTTP surface. Routes delegate to the domain layer; this module owns only
// transport concerns: auth extraction, status mapping, SSE framing.

pub mod audit;
pub mod auth;
pub mod chat;
pub mod credentials;
pub mod email;
pub mod knowledge;
pub mod llm_status;
pub mod memory;
pub mod model_routing;
pub mod rate_limit;
pub mod state;
pub mod webhooks;
pub mod workspaces;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::DeskError;
pub use state::AppState;

/// HTTP status mapping for the error taxonomy. Internal details are
/// sanitized out of 500 responses.
pub struct ApiError(pub DeskError);

impl From<DeskError> for ApiError {
    fn from(e: DeskError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            DeskError::Unauthorized => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            DeskError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            DeskError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            DeskError::Validation(_) | DeskError::Serialization(_) => {
                (StatusCode::BAD_REQUEST, self.0.to_string())
            }
            DeskError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, self.0.to_string()),
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
        };
        (status, Json(serde_json::json!({"detail": detail}))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Assemble the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat/messages", post(chat::post_message))
        .route("/api/chat/conversations/:id", get(chat::get_conversation))
        .route("/api/chat/confirmations/:widget_id", post(chat::post_confirmation))
        .route("/api/llm/status", get(llm_status::get_status))
        .route(
            "/api/admin/model-routing",
            get(model_routing::get_config).put(model_routing::put_config),
        )
        .route("/api/webhooks/:token", post(webhooks::receive))
        .route("/api/email/inbound/:provider", post(email::inbound))
        .route(
            "/api/workspaces",
            get(workspaces::list).post(workspaces::create),
        )
        .route("/api/workspaces/:id", axum::routing::delete(workspaces::delete))
        .route(
            "/api/knowledge/documents",
            get(knowledge::list).post(knowledge::create),
        )
        .route(
            "/api/knowledge/documents/:id",
            get(knowledge::get_one).delete(knowledge::delete),
        )
        .route("/api/knowledge/search", post(knowledge::search))
        .route(
            "/api/credentials",
            post(credentials::create),
        )
        .route("/api/credentials/:id", axum::routing::delete(credentials::delete))
        .route("/api/audit/events", get(audit::list))
        .route("/api/memory", get(memory::list).post(memory::create))
        .route(
            "/api/memory/:id",
            put(memory::update).delete(memory::delete),
        )
        .route("/api/workflows/:id/status", get(webhooks::workflow_status))
        .route("/api/workflows/:id/cancel", post(webhooks::cancel_workflow))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
