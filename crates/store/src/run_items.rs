//! Per-run item state (`run_items`). `(run_id, item_id)` is unique; the
//! materialization insert is idempotent across re-entries into a run.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{RunItem, RunItemState};

use crate::error::StoreError;
use crate::runs::StateCounts;

const RUN_ITEM_COLUMNS: &str =
    "id, run_id, item_id, state, position, error, tokens_used, cost, started_at, completed_at";

/// Stateless store for `run_items`.
pub struct RunItemStore;

impl RunItemStore {
    /// Materialize QUEUED rows for the given item ids in scope order.
    /// Existing `(run_id, item_id)` pairs are left untouched.
    pub async fn materialize(
        pool: &PgPool,
        run_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<u64, StoreError> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        let positions: Vec<i32> = (0..item_ids.len() as i32).collect();
        let result = sqlx::query(
            "INSERT INTO run_items (run_id, item_id, position)
             SELECT $1, item_id, position
             FROM UNNEST($2::uuid[], $3::int[]) AS t(item_id, position)
             ON CONFLICT (run_id, item_id) DO NOTHING",
        )
        .bind(run_id)
        .bind(item_ids)
        .bind(&positions)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// QUEUED items of a run in dispatch (scope) order.
    pub async fn queued(pool: &PgPool, run_id: Uuid) -> Result<Vec<RunItem>, StoreError> {
        let rows = sqlx::query_as::<_, RunItem>(&format!(
            "SELECT {RUN_ITEM_COLUMNS} FROM run_items
             WHERE run_id = $1 AND state = 'queued'
             ORDER BY position ASC"
        ))
        .bind(run_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn list(
        pool: &PgPool,
        run_id: Uuid,
        state: Option<RunItemState>,
    ) -> Result<Vec<RunItem>, StoreError> {
        let rows = match state {
            Some(state) => {
                sqlx::query_as::<_, RunItem>(&format!(
                    "SELECT {RUN_ITEM_COLUMNS} FROM run_items
                     WHERE run_id = $1 AND state = $2 ORDER BY position ASC"
                ))
                .bind(run_id)
                .bind(state)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, RunItem>(&format!(
                    "SELECT {RUN_ITEM_COLUMNS} FROM run_items
                     WHERE run_id = $1 ORDER BY position ASC"
                ))
                .bind(run_id)
                .fetch_all(pool)
                .await?
            }
        };
        Ok(rows)
    }

    /// QUEUED → PROCESSING. Returns false when the row was no longer queued
    /// (lost a race with cancellation or another worker).
    pub async fn mark_processing(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE run_items SET state = 'processing', started_at = $2
             WHERE id = $1 AND state = 'queued'",
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_completed(
        pool: &PgPool,
        id: Uuid,
        tokens_used: i64,
        cost: f64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE run_items
             SET state = 'completed', tokens_used = $2, cost = $3, completed_at = $4
             WHERE id = $1",
        )
        .bind(id)
        .bind(tokens_used)
        .bind(cost)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE run_items SET state = 'failed', error = $2, completed_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_skipped(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE run_items SET state = 'skipped', completed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// PROCESSING → QUEUED (semaphore-timeout requeue path).
    pub async fn requeue(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE run_items SET state = 'queued', started_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Cancel every still-QUEUED item of a run; returns how many flipped.
    pub async fn cancel_queued(
        pool: &PgPool,
        run_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE run_items SET state = 'cancelled', completed_at = $2
             WHERE run_id = $1 AND state = 'queued'",
        )
        .bind(run_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Per-state tally for a run.
    pub async fn counts(pool: &PgPool, run_id: Uuid) -> Result<StateCounts, StoreError> {
        let row = sqlx::query_as::<_, StateCounts>(
            "SELECT
                count(*) FILTER (WHERE state = 'queued') AS queued,
                count(*) FILTER (WHERE state = 'processing') AS processing,
                count(*) FILTER (WHERE state = 'completed') AS completed,
                count(*) FILTER (WHERE state = 'failed') AS failed,
                count(*) FILTER (WHERE state = 'skipped') AS skipped,
                count(*) FILTER (WHERE state = 'cancelled') AS cancelled
             FROM run_items WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    /// Item ids currently tied up in a non-terminal run item (auto-pump
    /// admission check).
    pub async fn active_item_ids(
        pool: &PgPool,
        item_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT item_id FROM run_items
             WHERE item_id = ANY($1) AND state IN ('queued', 'processing')",
        )
        .bind(item_ids)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }
}
