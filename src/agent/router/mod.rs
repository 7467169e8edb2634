// Two-tier model router: a cheap classifier picks a complexity tier, the
// routing config maps tiers to concrete models.

pub mod classifier;
pub mod config;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use classifier::ComplexityClassifier;
pub use config::RoutingConfigRepository;

const CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Fast,
    Balanced,
    Powerful,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Powerful => "powerful",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fast" => Some(Self::Fast),
            "balanced" => Some(Self::Balanced),
            "powerful" => Some(Self::Powerful),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassificationResult {
    pub tier: ComplexityTier,
    pub confidence: f32,
    pub reasoning: String,
}

/// Singleton routing configuration, cached by the repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub enabled: bool,
    pub classifier_model: Option<String>,
    pub default_tier: ComplexityTier,
    #[serde(default)]
    pub tier_mappings: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub model_string: String,
    pub tier: ComplexityTier,
    pub confidence: f32,
    pub reasoning: String,
    pub classifier_model: String,
    pub classifier_latency_ms: f64,
}

/// Routes LLM requests to cost-appropriate model tiers.
pub struct ModelRouter {
    classifier: ComplexityClassifier,
    config_repo: RoutingConfigRepository,
}

impl ModelRouter {
    pub fn new(classifier: ComplexityClassifier, config_repo: RoutingConfigRepository) -> Self {
        Self {
            classifier,
            config_repo,
        }
    }

    pub async fn is_enabled(&self) -> bool {
        matches!(self.config_repo.get_config().await, Some(config) if config.enabled)
    }

    /// Classify and route a message. Returns None when routing is disabled or
    /// not configured; falls back to the default tier on any classification
    /// failure.
    pub async fn route(
        &self,
        message: &str,
        tool_count: usize,
        tool_names: &[String],
        turn_count: usize,
    ) -> Option<RoutingDecision> {
        let config = self.config_repo.get_config().await?;
        if !config.enabled {
            return None;
        }
        if config.tier_mappings.is_empty() {
            tracing::debug!("routing enabled but no tier mappings configured");
            return None;
        }

        let start = std::time::Instant::now();
        let classification = self
            .classifier
            .classify(message, tool_count, tool_names, turn_count)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "classifier failed, falling back to default tier");
                ClassificationResult {
                    tier: config.default_tier,
                    confidence: 0.0,
                    reasoning: "Classifier error, using default tier".to_string(),
                }
            });
        let classifier_latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut tier = classification.tier;
        if classification.confidence < CONFIDENCE_THRESHOLD {
            tracing::info!(
                confidence = classification.confidence,
                tier = tier.as_str(),
                fallback = config.default_tier.as_str(),
                "low classification confidence, using default tier"
            );
            tier = config.default_tier;
        }

        let mut model_string = config.tier_mappings.get(tier.as_str()).cloned();
        if model_string.is_none() {
            tracing::info!(
                tier = tier.as_str(),
                fallback = config.default_tier.as_str(),
                "tier not mapped, using default tier"
            );
            tier = config.default_tier;
            model_string = config.tier_mappings.get(tier.as_str()).cloned();
        }
        let model_string = match model_string {
            Some(model) => model,
            None => {
                tracing::warn!(
                    tier = tier.as_str(),
                    "default tier also not mapped, routing disabled for this request"
                );
                return None;
            }
        };

        Some(RoutingDecision {
            model_string,
            tier,
            confidence: classification.confidence,
            reasoning: classification.reasoning,
            classifier_model: config
                .classifier_model
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            classifier_latency_ms,
        })
    }
}
