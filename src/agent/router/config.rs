// Routing configuration repository with an in-memory TTL cache. Readers get
// the stale cache when the database is briefly unavailable; writers
// invalidate before returning.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{ComplexityTier, RoutingConfig};
use crate::error::Result;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct CacheSlot {
    config: Option<RoutingConfig>,
    fetched_at: Option<Instant>,
}

#[derive(Clone)]
pub struct RoutingConfigRepository {
    pool: SqlitePool,
    cache_ttl: Duration,
    cache: Arc<Mutex<CacheSlot>>,
}

impl RoutingConfigRepository {
    pub fn new(pool: SqlitePool, cache_ttl: Duration) -> Self {
        Self {
            pool,
            cache_ttl,
            cache: Arc::new(Mutex::new(CacheSlot::default())),
        }
    }

    pub fn with_default_ttl(pool: SqlitePool) -> Self {
        Self::new(pool, DEFAULT_CACHE_TTL)
    }

    pub async fn invalidate(&self) {
        let mut slot = self.cache.lock().await;
        slot.config = None;
        slot.fetched_at = None;
    }

    /// Current routing config, served from cache while fresh. On a database
    /// error the stale cache is returned rather than failing the request.
    pub async fn get_config(&self) -> Option<RoutingConfig> {
        let mut slot = self.cache.lock().await;
        if let (Some(config), Some(fetched_at)) = (&slot.config, slot.fetched_at) {
            if fetched_at.elapsed() < self.cache_ttl {
                return Some(config.clone());
            }
        }

        match self.load().await {
            Ok(config) => {
                slot.config = config.clone();
                slot.fetched_at = Some(Instant::now());
                config
            }
            Err(e) => {
                tracing::debug!(error = %e, "failed to load routing config, serving stale cache");
                slot.config.clone()
            }
        }
    }

    async fn load(&self) -> Result<Option<RoutingConfig>> {
        let row = sqlx::query(
            "SELECT enabled, classifier_model, default_tier, tier_mappings, updated_at
             FROM model_routing_config WHERE id = 'default'",
        )
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tier_mappings: String = row.get("tier_mappings");
        let default_tier: String = row.get("default_tier");
        let updated_at: String = row.get("updated_at");
        Ok(Some(RoutingConfig {
            enabled: row.get("enabled"),
            classifier_model: row.get("classifier_model"),
            default_tier: ComplexityTier::parse(&default_tier).unwrap_or(ComplexityTier::Balanced),
            tier_mappings: serde_json::from_str(&tier_mappings).unwrap_or_default(),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /// Persist the config and invalidate the cache.
    pub async fn update_config(&self, config: &RoutingConfig) -> Result<RoutingConfig> {
        sqlx::query(
            "INSERT INTO model_routing_config (id, enabled, classifier_model, default_tier, tier_mappings, updated_at)
             VALUES ('default', ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               enabled = excluded.enabled,
               classifier_model = excluded.classifier_model,
               default_tier = excluded.default_tier,
               tier_mappings = excluded.tier_mappings,
               updated_at = excluded.updated_at",
        )
        .bind(config.enabled)
        .bind(&config.classifier_model)
        .bind(config.default_tier.as_str())
        .bind(serde_json::to_string(&config.tier_mappings)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.invalidate().await;
        Ok(self.get_config().await.unwrap_or_else(|| config.clone()))
    }
}
