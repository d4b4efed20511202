//! Append-only fetch audit trail (`fetch_log`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{FetchLogEntry, FetchOutcome};

use crate::error::StoreError;

/// One fetch attempt's bookkeeping, written after the attempt finishes.
#[derive(Debug, Clone)]
pub struct FetchRecord {
    pub feed_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    pub items_found: i32,
    pub items_new: i32,
    pub error_message: Option<String>,
    pub response_time_ms: i64,
}

/// Stateless store for `fetch_log`.
pub struct FetchLogStore;

impl FetchLogStore {
    pub async fn append(pool: &PgPool, record: &FetchRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO fetch_log
                (feed_id, started_at, completed_at, outcome, items_found, items_new,
                 error_message, response_time_ms)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.feed_id)
        .bind(record.started_at)
        .bind(record.completed_at)
        .bind(record.outcome)
        .bind(record.items_found)
        .bind(record.items_new)
        .bind(&record.error_message)
        .bind(record.response_time_ms)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn recent(
        pool: &PgPool,
        feed_id: Uuid,
        limit: i64,
    ) -> Result<Vec<FetchLogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, FetchLogEntry>(
            "SELECT id, feed_id, started_at, completed_at, outcome, items_found, items_new,
                    error_message, response_time_ms
             FROM fetch_log WHERE feed_id = $1
             ORDER BY started_at DESC LIMIT $2",
        )
        .bind(feed_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Total new items a feed produced since `since` (interval adaptation).
    pub async fn items_new_since(
        pool: &PgPool,
        feed_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let sum = sqlx::query_scalar::<_, Option<i64>>(
            "SELECT sum(items_new)::bigint FROM fetch_log
             WHERE feed_id = $1 AND started_at >= $2",
        )
        .bind(feed_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(sum.unwrap_or(0))
    }

    /// Count of feeds fetched successfully within the window (stats view).
    pub async fn success_count_since(
        pool: &PgPool,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM fetch_log WHERE outcome = 'success' AND started_at >= $1",
        )
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
