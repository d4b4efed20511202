//! Derived per-feed health (`feed_health`), recomputed from the fetch log
//! after every fetch.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::FeedHealth;

use crate::error::StoreError;

/// Stateless store for `feed_health`.
pub struct FeedHealthStore;

impl FeedHealthStore {
    pub async fn get(pool: &PgPool, feed_id: Uuid) -> Result<Option<FeedHealth>, StoreError> {
        let row = sqlx::query_as::<_, FeedHealth>(
            "SELECT feed_id, success_rate_7d, success_rate_30d, avg_response_time_ms,
                    uptime_ratio, consecutive_failures, last_success_at, last_failure_at,
                    updated_at
             FROM feed_health WHERE feed_id = $1",
        )
        .bind(feed_id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Recompute rolling rates from `fetch_log` and upsert the health row.
    /// The success/failure timestamps advance monotonically.
    pub async fn refresh_after_fetch(
        pool: &PgPool,
        feed_id: Uuid,
        success: bool,
        consecutive_failures: i32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO feed_health
                (feed_id, success_rate_7d, success_rate_30d, avg_response_time_ms,
                 uptime_ratio, consecutive_failures, last_success_at, last_failure_at, updated_at)
             SELECT
                $1,
                COALESCE(avg(CASE WHEN outcome = 'success' THEN 1.0 ELSE 0.0 END)
                    FILTER (WHERE started_at >= $4 - interval '7 days'), 0),
                COALESCE(avg(CASE WHEN outcome = 'success' THEN 1.0 ELSE 0.0 END)
                    FILTER (WHERE started_at >= $4 - interval '30 days'), 0),
                COALESCE(avg(response_time_ms)
                    FILTER (WHERE started_at >= $4 - interval '7 days'), 0),
                COALESCE(avg(CASE WHEN outcome IN ('success', 'empty') THEN 1.0 ELSE 0.0 END)
                    FILTER (WHERE started_at >= $4 - interval '30 days'), 0),
                $3,
                CASE WHEN $2 THEN $4 ELSE NULL END,
                CASE WHEN $2 THEN NULL ELSE $4 END,
                $4
             FROM fetch_log WHERE feed_id = $1
             ON CONFLICT (feed_id) DO UPDATE SET
                success_rate_7d = EXCLUDED.success_rate_7d,
                success_rate_30d = EXCLUDED.success_rate_30d,
                avg_response_time_ms = EXCLUDED.avg_response_time_ms,
                uptime_ratio = EXCLUDED.uptime_ratio,
                consecutive_failures = EXCLUDED.consecutive_failures,
                last_success_at = COALESCE(EXCLUDED.last_success_at, feed_health.last_success_at),
                last_failure_at = COALESCE(EXCLUDED.last_failure_at, feed_health.last_failure_at),
                updated_at = EXCLUDED.updated_at",
        )
        .bind(feed_id)
        .bind(success)
        .bind(consecutive_failures)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }
}
