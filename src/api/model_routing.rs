// Admin read/write of the model routing configuration.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::agent::router::{ComplexityTier, RoutingConfig};
use crate::error::DeskError;

/// GET /api/admin/model-routing
pub async fn get_config(
    State(state): State<AppState>,
    Session(session): Session,
) -> ApiResult<Json<serde_json::Value>> {
    require_permission(&session, "admin:routing")?;
    match state.routing_config.get_config().await {
        Some(config) => Ok(Json(serde_json::to_value(config).map_err(DeskError::from)?)),
        None => Ok(Json(serde_json::json!({
            "enabled": false,
            "classifier_model": null,
            "default_tier": "balanced",
            "tier_mappings": {},
        }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoutingRequest {
    pub enabled: bool,
    #[serde(default)]
    pub classifier_model: Option<String>,
    #[serde(default = "default_tier")]
    pub default_tier: String,
    #[serde(default)]
    pub tier_mappings: BTreeMap<String, String>,
}

fn default_tier() -> String {
    "balanced".to_string()
}

/// PUT /api/admin/model-routing
pub async fn put_config(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<UpdateRoutingRequest>,
) -> ApiResult<Json<RoutingConfig>> {
    require_permission(&session, "admin:routing")?;

    let default_tier = ComplexityTier::parse(&request.default_tier).ok_or_else(|| {
        ApiError(DeskError::Validation(format!(
            "unknown tier {:?}",
            request.default_tier
        )))
    })?;
    for tier in request.tier_mappings.keys() {
        if ComplexityTier::parse(tier).is_none() {
            return Err(ApiError(DeskError::Validation(format!(
                "unknown tier {tier:?} in tier_mappings"
            ))));
        }
    }

    let config = RoutingConfig {
        enabled: request.enabled,
        classifier_model: request.classifier_model,
        default_tier,
        tier_mappings: request.tier_mappings,
        updated_at: Utc::now(),
    };
    let saved = state
        .routing_config
        .update_config(&config)
        .await
        .map_err(ApiError)?;
    Ok(Json(saved))
}
