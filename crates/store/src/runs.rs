//! `analysis_runs` lifecycle and budget-accounting queries.
//!
//! Counter updates are single-statement increments so the run-level
//! invariant (queued + processed + failed + skipped = total) holds under
//! concurrent item workers without explicit row locks.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use newswire_core::{AnalysisRun, RunStatus, TriggerSource};

use crate::error::StoreError;

const RUN_COLUMNS: &str = "id, scope, params, status, trigger_source, model_tag, total_items, \
     queued_count, processed_count, failed_count, skipped_count, estimated_cost, actual_cost, \
     cancel_requested, error_message, created_at, started_at, completed_at";

/// Terminal-state tally for a run's items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct StateCounts {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub skipped: i64,
    pub cancelled: i64,
}

impl StateCounts {
    pub fn non_terminal(&self) -> i64 {
        self.queued + self.processing
    }

    pub fn total(&self) -> i64 {
        self.queued + self.processing + self.completed + self.failed + self.skipped + self.cancelled
    }
}

/// Stateless store for `analysis_runs`.
pub struct RunStore;

impl RunStore {
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        pool: &PgPool,
        scope: &serde_json::Value,
        params: &serde_json::Value,
        trigger: TriggerSource,
        model_tag: &str,
        total_items: i32,
        estimated_cost: f64,
    ) -> Result<AnalysisRun, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRun>(&format!(
            "INSERT INTO analysis_runs
                (scope, params, trigger_source, model_tag, total_items, queued_count, estimated_cost)
             VALUES ($1, $2, $3, $4, $5, $5, $6)
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(scope)
        .bind(params)
        .bind(trigger)
        .bind(model_tag)
        .bind(total_items)
        .bind(estimated_cost)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }

    pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<AnalysisRun>, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRun>(&format!(
            "SELECT {RUN_COLUMNS} FROM analysis_runs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(row)
    }

    pub async fn list(
        pool: &PgPool,
        active_only: bool,
        limit: i64,
    ) -> Result<Vec<AnalysisRun>, StoreError> {
        let sql = if active_only {
            format!(
                "SELECT {RUN_COLUMNS} FROM analysis_runs
                 WHERE status IN ('pending', 'running', 'paused')
                 ORDER BY created_at DESC LIMIT $1"
            )
        } else {
            format!(
                "SELECT {RUN_COLUMNS} FROM analysis_runs ORDER BY created_at DESC LIMIT $1"
            )
        };
        let rows = sqlx::query_as::<_, AnalysisRun>(&sql)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    pub async fn status(pool: &PgPool, id: Uuid) -> Result<Option<RunStatus>, StoreError> {
        let status = sqlx::query_scalar::<_, RunStatus>(
            "SELECT status FROM analysis_runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;
        Ok(status)
    }

    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: RunStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE analysis_runs SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// PENDING/PAUSED → RUNNING, stamping `started_at` on first start.
    pub async fn mark_running(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE analysis_runs
             SET status = 'running', started_at = COALESCE(started_at, $2)
             WHERE id = $1 AND status IN ('pending', 'running', 'paused')",
        )
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Transition to a terminal status, stamping `completed_at`. Refuses to
    /// overwrite an already-terminal run.
    pub async fn finish(
        pool: &PgPool,
        id: Uuid,
        status: RunStatus,
        error_message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE analysis_runs
             SET status = $2, error_message = COALESCE($3, error_message), completed_at = $4
             WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')",
        )
        .bind(id)
        .bind(status)
        .bind(error_message)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Reconcile run counters with the actual run-item tally. Called after
    /// materialization (including resume re-entries) so the counter
    /// invariant holds regardless of where the previous attempt stopped.
    pub async fn sync_counts(
        pool: &PgPool,
        id: Uuid,
        counts: &StateCounts,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE analysis_runs SET
                total_items = $2,
                queued_count = $3,
                processed_count = $4,
                failed_count = $5,
                skipped_count = $6
             WHERE id = $1",
        )
        .bind(id)
        .bind(counts.total() as i32)
        .bind((counts.queued + counts.processing) as i32)
        .bind(counts.completed as i32)
        .bind(counts.failed as i32)
        .bind(counts.skipped as i32)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record one item completing successfully.
    pub async fn record_item_success(
        pool: &PgPool,
        id: Uuid,
        cost: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE analysis_runs
             SET processed_count = processed_count + 1,
                 queued_count = greatest(queued_count - 1, 0),
                 actual_cost = actual_cost + $2
             WHERE id = $1",
        )
        .bind(id)
        .bind(cost)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_item_failure(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE analysis_runs
             SET failed_count = failed_count + 1,
                 queued_count = greatest(queued_count - 1, 0)
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn record_item_skipped(pool: &PgPool, id: Uuid) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE analysis_runs
             SET skipped_count = skipped_count + 1,
                 queued_count = greatest(queued_count - 1, 0)
             WHERE id = $1",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Flag cancellation; the orchestrator observes the bit between items.
    pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<AnalysisRun, StoreError> {
        let row = sqlx::query_as::<_, AnalysisRun>(&format!(
            "UPDATE analysis_runs SET cancel_requested = true
             WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
             RETURNING {RUN_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await?;
        row.ok_or_else(|| StoreError::Conflict(format!("run {} is already terminal", id)))
    }

    /// Runs created since `since`, optionally restricted by trigger source.
    pub async fn count_since(
        pool: &PgPool,
        since: DateTime<Utc>,
        trigger: Option<TriggerSource>,
    ) -> Result<i64, StoreError> {
        let count = match trigger {
            Some(trigger) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT count(*) FROM analysis_runs
                     WHERE created_at >= $1 AND trigger_source = $2",
                )
                .bind(since)
                .bind(trigger)
                .fetch_one(pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT count(*) FROM analysis_runs WHERE created_at >= $1",
                )
                .bind(since)
                .fetch_one(pool)
                .await?
            }
        };
        Ok(count)
    }

    /// Runs whose execution started since `since` (hourly start budget).
    pub async fn started_since(
        pool: &PgPool,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM analysis_runs
             WHERE started_at IS NOT NULL AND started_at >= $1",
        )
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    pub async fn active_count(pool: &PgPool) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM analysis_runs WHERE status IN ('running', 'paused')",
        )
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// RUNNING runs whose items are all terminal (completion-sweeper input).
    pub async fn running_ids(pool: &PgPool) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM analysis_runs WHERE status = 'running'",
        )
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// PAUSED runs eligible for resumption by the queue processor.
    pub async fn paused_ids(pool: &PgPool) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM analysis_runs WHERE status = 'paused' AND NOT cancel_requested",
        )
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// RUNNING runs that started before `cutoff` (watchdog input).
    pub async fn overrunning(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM analysis_runs
             WHERE status = 'running' AND started_at IS NOT NULL AND started_at < $1",
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?;
        Ok(ids)
    }

    /// Spend and run count against a single feed's items today (per-feed caps).
    pub async fn feed_usage_since(
        pool: &PgPool,
        feed_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<(i64, f64), StoreError> {
        let row = sqlx::query_as::<_, (i64, Option<f64>)>(
            "SELECT count(DISTINCT ri.run_id), sum(ri.cost)
             FROM run_items ri
             JOIN items i ON i.id = ri.item_id
             JOIN analysis_runs r ON r.id = ri.run_id
             WHERE i.feed_id = $1 AND r.created_at >= $2",
        )
        .bind(feed_id)
        .bind(since)
        .fetch_one(pool)
        .await?;
        Ok((row.0, row.1.unwrap_or(0.0)))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_counts_totals() {
        let counts = StateCounts {
            queued: 2,
            processing: 1,
            completed: 5,
            failed: 1,
            skipped: 3,
            cancelled: 0,
        };
        assert_eq!(counts.non_terminal(), 3);
        assert_eq!(counts.total(), 12);
    }

    #[test]
    fn test_state_counts_default_is_empty() {
        let counts = StateCounts::default();
        assert_eq!(counts.total(), 0);
        assert_eq!(counts.non_terminal(), 0);
    }
}
