//! FIFO queue of run requests waiting for governor capacity
//! (`queued_runs`). The `held` flag implements the emergency-halt holding
//! area: held entries keep their serial order and rejoin the queue on
//! resume.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StoreError;

/// Queue row: the serialized request plus the pre-created PENDING run id.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedRun {
    pub id: i64,
    pub request: serde_json::Value,
    pub run_id: Uuid,
    pub held: bool,
}

/// Stateless store for `queued_runs`.
pub struct QueuedRunStore;

impl QueuedRunStore {
    pub async fn enqueue(
        pool: &PgPool,
        run_id: Uuid,
        request: &serde_json::Value,
    ) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO queued_runs (request, run_id) VALUES ($1, $2) RETURNING id",
        )
        .bind(request)
        .bind(run_id)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    /// Pop the front of the live queue, if any.
    pub async fn dequeue_front(pool: &PgPool) -> Result<Option<QueuedRun>, StoreError> {
        let row = sqlx::query_as::<_, QueuedRun>(
            "DELETE FROM queued_runs
             WHERE id = (SELECT id FROM queued_runs WHERE NOT held
                         ORDER BY id ASC LIMIT 1 FOR UPDATE SKIP LOCKED)
             RETURNING id, request, run_id, held",
        )
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    /// Remove a specific queued entry (cancellation of a queued run).
    pub async fn remove(pool: &PgPool, run_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM queued_runs WHERE run_id = $1")
            .bind(run_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 1-based position of a run in the live queue.
    pub async fn position(pool: &PgPool, run_id: Uuid) -> Result<Option<i64>, StoreError> {
        let pos = sqlx::query_scalar::<_, i64>(
            "SELECT pos FROM (
                SELECT run_id, row_number() OVER (ORDER BY id ASC) AS pos
                FROM queued_runs WHERE NOT held
             ) numbered WHERE run_id = $1",
        )
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
        Ok(pos)
    }

    pub async fn depth(pool: &PgPool) -> Result<i64, StoreError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT count(*) FROM queued_runs WHERE NOT held")
                .fetch_one(pool)
                .await?;
        Ok(count)
    }

    /// Move the live queue into the halted holding area.
    pub async fn hold_all(pool: &PgPool) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE queued_runs SET held = true WHERE NOT held")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Re-enqueue held entries; serial ids preserve the original order.
    pub async fn release_all(pool: &PgPool) -> Result<u64, StoreError> {
        let result = sqlx::query("UPDATE queued_runs SET held = false WHERE held")
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
