//! Per-feed analysis caps (`feed_limits`).

use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::FeedLimits;

use crate::error::StoreError;

/// Request body for setting per-feed caps (upsert semantics).
#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct SetFeedLimits {
    pub max_daily_runs: Option<i32>,
    pub max_daily_cost: Option<f64>,
    pub max_monthly_cost: Option<f64>,
    pub alert_threshold: Option<f64>,
    #[serde(default)]
    pub auto_disable: bool,
    #[serde(default)]
    pub emergency_stopped: bool,
}

/// Stateless store for `feed_limits`.
pub struct FeedLimitStore;

impl FeedLimitStore {
    pub async fn get(pool: &PgPool, feed_id: Uuid) -> Result<Option<FeedLimits>, StoreError> {
        let row = sqlx::query_as::<_, FeedLimits>(
            "SELECT feed_id, max_daily_runs, max_daily_cost, max_monthly_cost,
                    alert_threshold, auto_disable, emergency_stopped, updated_at
             FROM feed_limits WHERE feed_id = $1",
        )
        .bind(feed_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn set(
        pool: &PgPool,
        feed_id: Uuid,
        req: SetFeedLimits,
    ) -> Result<FeedLimits, StoreError> {
        let row = sqlx::query_as::<_, FeedLimits>(
            "INSERT INTO feed_limits
                (feed_id, max_daily_runs, max_daily_cost, max_monthly_cost,
                 alert_threshold, auto_disable, emergency_stopped)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (feed_id) DO UPDATE SET
                max_daily_runs = EXCLUDED.max_daily_runs,
                max_daily_cost = EXCLUDED.max_daily_cost,
                max_monthly_cost = EXCLUDED.max_monthly_cost,
                alert_threshold = EXCLUDED.alert_threshold,
                auto_disable = EXCLUDED.auto_disable,
                emergency_stopped = EXCLUDED.emergency_stopped,
                updated_at = now()
             RETURNING feed_id, max_daily_runs, max_daily_cost, max_monthly_cost,
                       alert_threshold, auto_disable, emergency_stopped, updated_at",
        )
        .bind(feed_id)
        .bind(req.max_daily_runs)
        .bind(req.max_daily_cost)
        .bind(req.max_monthly_cost)
        .bind(req.alert_threshold)
        .bind(req.auto_disable)
        .bind(req.emergency_stopped)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_request_defaults() {
        let req: SetFeedLimits = serde_json::from_str("{}").unwrap();
        assert!(req.max_daily_runs.is_none());
        assert!(!req.auto_disable);
        assert!(!req.emergency_stopped);
    }
}
