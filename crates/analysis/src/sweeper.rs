//! Safety-net periodic tasks: the completion sweeper and the run
//! watchdog. Both are explicit loops with stop signals, mirroring every
//! other background task in the process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use sqlx::PgPool;
use tracing::{info, warn};

use newswire_core::{Clock, RunStatus};
use newswire_store::{RunItemStore, RunStore};

use crate::orchestrator::Orchestrator;

/// Sweep RUNNING runs whose items are all terminal but whose status never
/// flipped (e.g. the executing task died mid-flight).
pub async fn run_completion_sweeper(
    orchestrator: Arc<Orchestrator>,
    pool: PgPool,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    info!("completion sweeper started (interval: {}s)", interval.as_secs());
    while !stop.load(Ordering::Relaxed) {
        tokio::time::sleep(interval).await;

        let running = match RunStore::running_ids(&pool).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "sweeper: failed to list running runs");
                continue;
            }
        };
        for run_id in running {
            if let Err(e) = orchestrator.check_completion(run_id).await {
                warn!(run_id = %run_id, error = %e, "sweeper: completion check failed");
            }
        }
    }
    info!("completion sweeper stopped");
}

/// Abort runs that exceeded the global wall-clock ceiling.
pub async fn run_watchdog(
    pool: PgPool,
    clock: Arc<dyn Clock>,
    ceiling_minutes: u64,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    info!(
        "run watchdog started (ceiling: {}m, interval: {}s)",
        ceiling_minutes,
        interval.as_secs()
    );
    while !stop.load(Ordering::Relaxed) {
        tokio::time::sleep(interval).await;

        let cutoff = clock.now() - ChronoDuration::minutes(ceiling_minutes as i64);
        let overrunning = match RunStore::overrunning(&pool, cutoff).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "watchdog: failed to list overrunning runs");
                continue;
            }
        };

        for run_id in overrunning {
            warn!(run_id = %run_id, "watchdog: run exceeded ceiling — failing");
            let now = clock.now();
            if let Err(e) = RunItemStore::cancel_queued(&pool, run_id, now).await {
                warn!(run_id = %run_id, error = %e, "watchdog: failed to cancel queued items");
            }
            if let Err(e) = RunStore::finish(
                &pool,
                run_id,
                RunStatus::Failed,
                Some("internal_error: run exceeded watchdog ceiling"),
                now,
            )
            .await
            {
                warn!(run_id = %run_id, error = %e, "watchdog: failed to fail run");
            }
        }
    }
    info!("run watchdog stopped");
}
