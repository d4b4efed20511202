//! Run execution: drive a run's items to terminal state through the
//! semaphore, rate limiter, breaker, and LLM classifier.
//!
//! Dispatch is in scope order; completion may be out of order. Every item
//! worker evaluates run completion after recording its terminal state, so
//! the run flips to COMPLETED/FAILED without a coordinator pass.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use newswire_core::{Clock, RunStatus};
use newswire_llm::Classifier;
use newswire_store::{AnalysisStore, ItemStore, RunItemStore, RunStore, StoreError};

use crate::breaker::CircuitBreaker;
use crate::limiter::AdaptiveRateLimiter;
use crate::scope::resolve_scope;
use crate::semaphore::AnalysisSemaphore;

/// Delay before a semaphore/limiter-timeout item is retried.
const REQUEUE_DELAY: Duration = Duration::from_millis(250);

/// Content excerpt length handed to the classifier.
const SUMMARY_CHARS: usize = 2000;

/// Failed-item share past which a completed run is logged as degraded.
const DEGRADED_THRESHOLD: f64 = 0.5;

pub struct Orchestrator {
    pool: PgPool,
    classifier: Arc<Classifier>,
    limiter: Arc<AdaptiveRateLimiter>,
    breaker: Arc<CircuitBreaker>,
    semaphore: Arc<AnalysisSemaphore>,
    clock: Arc<dyn Clock>,
    /// Emergency-halt bit shared with the governor.
    halt: Arc<AtomicBool>,
    semaphore_timeout: Duration,
    limiter_timeout: Duration,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        classifier: Arc<Classifier>,
        limiter: Arc<AdaptiveRateLimiter>,
        breaker: Arc<CircuitBreaker>,
        semaphore: Arc<AnalysisSemaphore>,
        clock: Arc<dyn Clock>,
        halt: Arc<AtomicBool>,
        semaphore_timeout: Duration,
        limiter_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            classifier,
            limiter,
            breaker,
            semaphore,
            clock,
            halt,
            semaphore_timeout,
            limiter_timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }

    /// Spawn the execution loop for a run as a background task.
    pub fn spawn_run(self: Arc<Self>, run_id: Uuid) {
        let orchestrator = self;
        tokio::spawn(async move {
            if let Err(e) = orchestrator.execute_run(run_id).await {
                warn!(run_id = %run_id, error = %e, "run execution failed");
                let _ = RunStore::finish(
                    &orchestrator.pool,
                    run_id,
                    RunStatus::Failed,
                    Some(&format!("internal_error: {}", e)),
                    orchestrator.clock.now(),
                )
                .await;
            }
        });
    }

    /// Execute (or resume) one run. Safe to re-enter: materialization is
    /// idempotent and counters are reconciled from the item tally.
    pub async fn execute_run(&self, run_id: Uuid) -> Result<(), StoreError> {
        let run = match RunStore::get(&self.pool, run_id).await? {
            Some(run) => run,
            None => return Err(StoreError::NotFound(run_id)),
        };
        if run.status.is_terminal() {
            return Ok(());
        }

        let scope = run
            .scope()
            .map_err(|e| StoreError::Validation(format!("stored scope unreadable: {}", e)))?;
        let params = run
            .params()
            .map_err(|e| StoreError::Validation(format!("stored params unreadable: {}", e)))?;

        RunStore::mark_running(&self.pool, run_id, self.clock.now()).await?;
        info!(run_id = %run_id, model = %run.model_tag, "run started");

        // Materialize run items; skip pairs that already exist.
        let ids = resolve_scope(&self.pool, &scope, &params).await?;
        RunItemStore::materialize(&self.pool, run_id, &ids).await?;
        let counts = RunItemStore::counts(&self.pool, run_id).await?;
        RunStore::sync_counts(&self.pool, run_id, &counts).await?;

        let mut queue: VecDeque<_> =
            RunItemStore::queued(&self.pool, run_id).await?.into();
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut cancelled = false;
        let mut paused = false;

        while let Some(run_item) = queue.pop_front() {
            // Halt and cancellation are checked at every item boundary.
            if self.is_halted() {
                paused = true;
                break;
            }
            let current = RunStore::get(&self.pool, run_id).await?;
            match current {
                Some(run) if run.cancel_requested => {
                    cancelled = true;
                    break;
                }
                Some(run) if run.status.is_terminal() => return Ok(()),
                Some(_) => {}
                None => return Ok(()),
            }

            // Already analyzed and not overriding: zero-cost skip, no LLM call.
            if !params.override_existing
                && AnalysisStore::exists(&self.pool, run_item.item_id).await?
            {
                RunItemStore::mark_skipped(&self.pool, run_item.id, self.clock.now()).await?;
                RunStore::record_item_skipped(&self.pool, run_id).await?;
                self.check_completion(run_id).await?;
                continue;
            }

            // Slot first, token second; both waits are bounded.
            let permit = match self.semaphore.acquire(self.semaphore_timeout).await {
                Some(permit) => permit,
                None => {
                    queue.push_back(run_item);
                    tokio::time::sleep(REQUEUE_DELAY).await;
                    continue;
                }
            };

            if !self.breaker.allow_request() {
                drop(permit);
                paused = true;
                break;
            }

            if !self.limiter.acquire(self.limiter_timeout).await {
                drop(permit);
                queue.push_back(run_item);
                tokio::time::sleep(REQUEUE_DELAY).await;
                continue;
            }

            if !RunItemStore::mark_processing(&self.pool, run_item.id, self.clock.now()).await? {
                // Lost a race with cancellation; the slot goes back.
                drop(permit);
                continue;
            }

            let pool = self.pool.clone();
            let classifier = Arc::clone(&self.classifier);
            let limiter = Arc::clone(&self.limiter);
            let breaker = Arc::clone(&self.breaker);
            let clock = Arc::clone(&self.clock);
            let model_tag = run.model_tag.clone();
            let override_existing = params.override_existing;
            let item_id = run_item.item_id;
            let run_item_id = run_item.id;

            workers.spawn(async move {
                let _permit = permit;
                process_item(
                    &pool,
                    &classifier,
                    &limiter,
                    &breaker,
                    clock,
                    run_id,
                    run_item_id,
                    item_id,
                    &model_tag,
                    override_existing,
                )
                .await;
            });
        }

        if cancelled {
            // Remaining QUEUED items flip immediately; in-flight calls run
            // to completion below and record their outcomes first.
            let flipped = RunItemStore::cancel_queued(&self.pool, run_id, self.clock.now()).await?;
            info!(run_id = %run_id, cancelled_items = flipped, "cancellation observed");
        }

        // Drain in-flight workers; their results land before any terminal
        // transition of the run.
        while workers.join_next().await.is_some() {}

        if cancelled {
            let counts = RunItemStore::counts(&self.pool, run_id).await?;
            RunStore::sync_counts(&self.pool, run_id, &counts).await?;
            RunStore::finish(
                &self.pool,
                run_id,
                RunStatus::Cancelled,
                None,
                self.clock.now(),
            )
            .await?;
            info!(run_id = %run_id, "run cancelled");
            return Ok(());
        }

        if paused {
            RunStore::set_status(&self.pool, run_id, RunStatus::Paused).await?;
            info!(run_id = %run_id, halted = self.is_halted(), "run paused");
            return Ok(());
        }

        // A cancellation that landed after the last dispatch still
        // terminalizes the run here rather than leaving it RUNNING.
        if let Some(run) = RunStore::get(&self.pool, run_id).await? {
            if run.cancel_requested && !run.status.is_terminal() {
                let now = self.clock.now();
                RunItemStore::cancel_queued(&self.pool, run_id, now).await?;
                let counts = RunItemStore::counts(&self.pool, run_id).await?;
                RunStore::sync_counts(&self.pool, run_id, &counts).await?;
                RunStore::finish(&self.pool, run_id, RunStatus::Cancelled, None, now).await?;
                info!(run_id = %run_id, "run cancelled after final dispatch");
                return Ok(());
            }
        }

        self.check_completion(run_id).await?;
        Ok(())
    }

    /// Flip a run to its terminal state once no items remain in flight.
    /// Cancelled runs are terminalized by the cancellation path instead.
    pub async fn check_completion(&self, run_id: Uuid) -> Result<(), StoreError> {
        let counts = RunItemStore::counts(&self.pool, run_id).await?;
        if counts.non_terminal() > 0 {
            return Ok(());
        }

        let run = match RunStore::get(&self.pool, run_id).await? {
            Some(run) => run,
            None => return Ok(()),
        };
        if run.status.is_terminal() || run.cancel_requested {
            return Ok(());
        }

        let status = if counts.total() > 0 && counts.failed == counts.total() {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        if counts.total() > 0 {
            let failed_share = counts.failed as f64 / counts.total() as f64;
            if status == RunStatus::Completed && failed_share > DEGRADED_THRESHOLD {
                warn!(
                    run_id = %run_id,
                    failed = counts.failed,
                    total = counts.total(),
                    "run completed degraded"
                );
            }
        }

        if RunStore::finish(&self.pool, run_id, status, None, self.clock.now()).await? {
            info!(
                run_id = %run_id,
                status = ?status,
                completed = counts.completed,
                failed = counts.failed,
                skipped = counts.skipped,
                "run finished"
            );
        }
        Ok(())
    }
}

/// Classify one item and record the outcome. Runs inside a worker task
/// holding a semaphore permit.
#[allow(clippy::too_many_arguments)]
async fn process_item(
    pool: &PgPool,
    classifier: &Classifier,
    limiter: &AdaptiveRateLimiter,
    breaker: &CircuitBreaker,
    clock: Arc<dyn Clock>,
    run_id: Uuid,
    run_item_id: Uuid,
    item_id: Uuid,
    model_tag: &str,
    override_existing: bool,
) {
    let item = match ItemStore::get(pool, item_id).await {
        Ok(Some(item)) => item,
        Ok(None) => {
            let _ = RunItemStore::mark_failed(pool, run_item_id, "not_found: item deleted", clock.now()).await;
            let _ = RunStore::record_item_failure(pool, run_id).await;
            return;
        }
        Err(e) => {
            let _ = RunItemStore::mark_failed(
                pool,
                run_item_id,
                &format!("internal_error: {}", e),
                clock.now(),
            )
            .await;
            let _ = RunStore::record_item_failure(pool, run_id).await;
            return;
        }
    };

    let summary: String = item.content.chars().take(SUMMARY_CHARS).collect();

    match classifier.classify(&item.title, &summary, Some(model_tag)).await {
        Ok(result) => {
            breaker.record_success();
            limiter.record_success();

            let written = AnalysisStore::upsert(
                pool,
                item_id,
                &result.payload,
                !override_existing,
            )
            .await;

            match written {
                Ok(true) => {
                    let tokens = (result.input_tokens + result.output_tokens) as i64;
                    let _ = RunItemStore::mark_completed(
                        pool,
                        run_item_id,
                        tokens,
                        result.cost_usd,
                        clock.now(),
                    )
                    .await;
                    let _ = RunStore::record_item_success(pool, run_id, result.cost_usd).await;
                }
                Ok(false) => {
                    // Another writer landed first; first write wins.
                    debug!(item_id = %item_id, "analysis already present — skipped");
                    let _ = RunItemStore::mark_skipped(pool, run_item_id, clock.now()).await;
                    let _ = RunStore::record_item_skipped(pool, run_id).await;
                }
                Err(e) => {
                    let _ = RunItemStore::mark_failed(
                        pool,
                        run_item_id,
                        &format!("internal_error: {}", e),
                        clock.now(),
                    )
                    .await;
                    let _ = RunStore::record_item_failure(pool, run_id).await;
                }
            }
        }
        Err(e) => {
            if e.is_provider_fault() {
                breaker.record_failure();
                limiter.record_failure();
            } else {
                // Parseable transport, unparseable payload: the provider is
                // up, so the breaker stays out of it.
                breaker.record_success();
            }
            let _ = RunItemStore::mark_failed(
                pool,
                run_item_id,
                &format!("{}: {}", e.kind(), e),
                clock.now(),
            )
            .await;
            let _ = RunStore::record_item_failure(pool, run_id).await;
        }
    }

    // Completion is evaluated after every item, not by a coordinator.
    let counts = RunItemStore::counts(pool, run_id).await;
    if let Ok(counts) = counts {
        if counts.non_terminal() == 0 {
            if let Ok(Some(run)) = RunStore::get(pool, run_id).await {
                if !run.status.is_terminal() && !run.cancel_requested {
                    let status = if counts.total() > 0 && counts.failed == counts.total() {
                        RunStatus::Failed
                    } else {
                        RunStatus::Completed
                    };
                    let _ = RunStore::finish(pool, run_id, status, None, clock.now()).await;
                }
            }
        }
    }
}
