//! Background task wiring. Every periodic task is an explicit loop with a
//! shared stop signal; nothing hides in a global event loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use uuid::Uuid;

use newswire_analysis::auto::AutoAnalysisPump;
use newswire_analysis::sweeper::{run_completion_sweeper, run_watchdog};

use crate::state::AppState;

const QUEUE_PROCESS_INTERVAL: Duration = Duration::from_secs(10);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(60);
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

/// Stop signal shared by all background tasks.
pub struct Shutdown {
    stop: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn trigger(&self) {
        self.stop.store(true, Ordering::Relaxed);
        info!("shutdown signal raised");
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the full background task set: feed scheduler, auto pump, queue
/// processor, completion sweeper, watchdog, and metrics refresher.
pub fn spawn_background_tasks(
    state: Arc<AppState>,
    intake_rx: UnboundedReceiver<(Uuid, Uuid)>,
    shutdown: &Shutdown,
) {
    // Feed scheduler loop.
    {
        let scheduler = Arc::clone(&state.scheduler);
        let stop = shutdown.signal();
        tokio::spawn(async move {
            scheduler.run(stop).await;
        });
    }

    // Auto-analysis pump.
    {
        let pump = AutoAnalysisPump::new(
            state.pool.clone(),
            Arc::clone(&state.governor),
            state.config.auto.clone(),
            Arc::new(newswire_core::SystemClock),
        );
        let stop = shutdown.signal();
        tokio::spawn(async move {
            pump.run(intake_rx, stop).await;
        });
    }

    // Governor queue processor (also resumes breaker-paused runs).
    {
        let governor = Arc::clone(&state.governor);
        let stop = shutdown.signal();
        tokio::spawn(async move {
            info!(
                "queue processor started (interval: {}s)",
                QUEUE_PROCESS_INTERVAL.as_secs()
            );
            while !stop.load(Ordering::Relaxed) {
                tokio::time::sleep(QUEUE_PROCESS_INTERVAL).await;
                if let Err(e) = governor.process_queue().await {
                    warn!(error = %e, "queue processing failed");
                }
            }
            info!("queue processor stopped");
        });
    }

    // Completion sweeper.
    {
        let orchestrator = Arc::clone(&state.orchestrator);
        let pool = state.pool.clone();
        let stop = shutdown.signal();
        tokio::spawn(run_completion_sweeper(
            orchestrator,
            pool,
            SWEEP_INTERVAL,
            stop,
        ));
    }

    // Run watchdog.
    {
        let pool = state.pool.clone();
        let stop = shutdown.signal();
        let ceiling = state.config.analysis.watchdog_minutes;
        tokio::spawn(run_watchdog(
            pool,
            Arc::new(newswire_core::SystemClock),
            ceiling,
            WATCHDOG_INTERVAL,
            stop,
        ));
    }

    // Metrics refresher.
    {
        let state = Arc::clone(&state);
        let stop = shutdown.signal();
        tokio::spawn(async move {
            info!(
                "metrics refresher started (interval: {}s)",
                METRICS_REFRESH_INTERVAL.as_secs()
            );
            while !stop.load(Ordering::Relaxed) {
                tokio::time::sleep(METRICS_REFRESH_INTERVAL).await;
                state.metrics.observe_components(
                    &state.limiter.snapshot(),
                    &state.breaker.snapshot(),
                    &state.semaphore.snapshot(),
                );
                state.metrics.refresh_from_store(&state.pool).await;
            }
            info!("metrics refresher stopped");
        });
    }
}
