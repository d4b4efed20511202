//! Auto-analysis batch bookkeeping (`pending_auto_analysis`).

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{PendingAutoAnalysis, PendingStatus};

use crate::error::StoreError;

const PENDING_COLUMNS: &str =
    "id, feed_id, item_ids, status, run_id, created_at, processed_at";

/// Stateless store for `pending_auto_analysis`.
pub struct PendingAutoStore;

impl PendingAutoStore {
    pub async fn create_batch(
        pool: &PgPool,
        feed_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<PendingAutoAnalysis, StoreError> {
        let row = sqlx::query_as::<_, PendingAutoAnalysis>(&format!(
            "INSERT INTO pending_auto_analysis (feed_id, item_ids)
             VALUES ($1, $2)
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(feed_id)
        .bind(serde_json::to_value(item_ids).unwrap_or_default())
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// PENDING batches in FIFO order.
    pub async fn pending(pool: &PgPool) -> Result<Vec<PendingAutoAnalysis>, StoreError> {
        let rows = sqlx::query_as::<_, PendingAutoAnalysis>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_auto_analysis
             WHERE status = 'pending' ORDER BY created_at ASC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// PROCESSING batches, for close-out polling.
    pub async fn processing(pool: &PgPool) -> Result<Vec<PendingAutoAnalysis>, StoreError> {
        let rows = sqlx::query_as::<_, PendingAutoAnalysis>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_auto_analysis
             WHERE status = 'processing' ORDER BY created_at ASC"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn mark_processing(
        pool: &PgPool,
        id: Uuid,
        run_id: Uuid,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE pending_auto_analysis SET status = 'processing', run_id = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(run_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn close(
        pool: &PgPool,
        id: Uuid,
        status: PendingStatus,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE pending_auto_analysis SET status = $2, processed_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Item ids among `item_ids` already held by a non-terminal batch
    /// (admission dedup: at most one open entry per item).
    pub async fn open_item_ids(
        pool: &PgPool,
        item_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT (elem)::uuid FROM pending_auto_analysis p,
                    jsonb_array_elements_text(p.item_ids) AS elem
             WHERE p.status IN ('pending', 'processing')
               AND (elem)::uuid = ANY($1)",
        )
        .bind(item_ids)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    pub async fn open_count(pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM pending_auto_analysis WHERE status IN ('pending', 'processing')",
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }
}
