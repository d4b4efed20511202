//! Run governance: daily/hourly/concurrent budgets, the FIFO run queue,
//! per-feed caps, cancellation, and the emergency halt.
//!
//! Budget order: a halted system rejects everything; the daily caps
//! (auto budget first, then the shared cap) reject; the hourly and
//! concurrency limits merely queue. The queue processor starts queued
//! runs as budgets free up and resumes breaker-paused runs once the
//! breaker admits requests again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use newswire_core::config::GovernorConfig;
use newswire_core::{Clock, ErrorKind, RunParams, RunScope, RunStatus, TriggerSource};
use newswire_store::{
    FeedLimitStore, QueuedRunStore, RunItemStore, RunStore, StoreError,
};

use crate::orchestrator::Orchestrator;
use crate::preview::{compute_preview, Preview};

/// A validated request for a new run.
#[derive(Debug, Clone, serde::Deserialize, Serialize, ToSchema)]
pub struct RunRequest {
    pub scope: RunScope,
    #[serde(default)]
    pub params: RunParams,
    #[serde(default = "default_trigger")]
    pub trigger: TriggerSource,
}

fn default_trigger() -> TriggerSource {
    TriggerSource::Api
}

/// Outcome of `request_run`.
#[derive(Debug)]
pub enum RunDecision {
    Started { run_id: Uuid },
    Queued { run_id: Uuid, position: i64 },
    Rejected { kind: ErrorKind, message: String },
}

/// Manager-API snapshot of governor state.
#[derive(Debug, Serialize, ToSchema)]
pub struct GovernorStatus {
    pub halted: bool,
    pub max_runs_per_day: u32,
    pub max_auto_runs_per_day: u32,
    pub max_runs_per_hour: u32,
    pub max_concurrent_runs: u32,
    pub runs_today: i64,
    pub auto_runs_today: i64,
    pub runs_started_this_hour: i64,
    pub active_runs: i64,
    pub queue_depth: i64,
}

pub struct RunGovernor {
    pool: PgPool,
    config: GovernorConfig,
    clock: Arc<dyn Clock>,
    orchestrator: Arc<Orchestrator>,
    halt: Arc<AtomicBool>,
    avg_tokens_per_item: u32,
    default_model: String,
    default_rate: f64,
}

impl RunGovernor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        config: GovernorConfig,
        clock: Arc<dyn Clock>,
        orchestrator: Arc<Orchestrator>,
        halt: Arc<AtomicBool>,
        avg_tokens_per_item: u32,
        default_model: String,
        default_rate: f64,
    ) -> Self {
        Self {
            pool,
            config,
            clock,
            orchestrator,
            halt,
            avg_tokens_per_item,
            default_model,
            default_rate,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halt.load(Ordering::Relaxed)
    }

    fn model_for(&self, params: &RunParams) -> String {
        if params.model_tag.is_empty() {
            self.default_model.clone()
        } else {
            params.model_tag.clone()
        }
    }

    /// Deterministic preview of a request, no side effects.
    pub async fn preview(&self, request: &RunRequest) -> Result<Preview, StoreError> {
        let model = self.model_for(&request.params);
        compute_preview(
            &self.pool,
            &request.scope,
            &request.params,
            &model,
            self.avg_tokens_per_item,
            self.default_rate,
        )
        .await
    }

    /// Validate, budget-check, and either start, queue, or reject a run.
    pub async fn request_run(&self, request: RunRequest) -> Result<RunDecision, StoreError> {
        if self.is_halted() {
            return Ok(RunDecision::Rejected {
                kind: ErrorKind::SystemHalted,
                message: "analysis system is halted".to_string(),
            });
        }

        if request.params.limit == 0 {
            return Ok(RunDecision::Rejected {
                kind: ErrorKind::ValidationError,
                message: "params.limit must be at least 1".to_string(),
            });
        }

        // Per-feed caps apply when the scope touches exactly one feed.
        if let Some(feed_id) = request.scope.single_feed() {
            if let Some(rejection) = self.check_feed_limits(feed_id).await? {
                return Ok(rejection);
            }
        }

        let now = self.clock.now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);

        // Auto runs burn their dedicated budget before the shared cap.
        if request.trigger == TriggerSource::Auto {
            let auto_today =
                RunStore::count_since(&self.pool, day_start, Some(TriggerSource::Auto)).await?;
            if auto_today >= self.config.max_auto_runs_per_day as i64 {
                return Ok(RunDecision::Rejected {
                    kind: ErrorKind::LimitExceeded,
                    message: format!(
                        "auto-analysis budget exhausted ({}/day)",
                        self.config.max_auto_runs_per_day
                    ),
                });
            }
        }

        let today = RunStore::count_since(&self.pool, day_start, None).await?;
        if today >= self.config.max_runs_per_day as i64 {
            return Ok(RunDecision::Rejected {
                kind: ErrorKind::LimitExceeded,
                message: format!("daily run budget exhausted ({}/day)", self.config.max_runs_per_day),
            });
        }

        let preview = self.preview(&request).await?;
        let model = self.model_for(&request.params);

        let scope_json = serde_json::to_value(&request.scope)
            .map_err(|e| StoreError::Validation(e.to_string()))?;
        let params_json = serde_json::to_value(&request.params)
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        let run = RunStore::create(
            &self.pool,
            &scope_json,
            &params_json,
            request.trigger,
            &model,
            preview.total_items as i32,
            preview.estimated_cost_usd,
        )
        .await?;

        if self.can_start_now().await? {
            Arc::clone(&self.orchestrator).spawn_run(run.id);
            info!(run_id = %run.id, trigger = ?request.trigger, "run started");
            Ok(RunDecision::Started { run_id: run.id })
        } else {
            let request_json = serde_json::to_value(&request)
                .map_err(|e| StoreError::Validation(e.to_string()))?;
            QueuedRunStore::enqueue(&self.pool, run.id, &request_json).await?;
            let position = QueuedRunStore::position(&self.pool, run.id)
                .await?
                .unwrap_or(1);
            info!(run_id = %run.id, position = position, "run queued");
            Ok(RunDecision::Queued {
                run_id: run.id,
                position,
            })
        }
    }

    async fn check_feed_limits(&self, feed_id: Uuid) -> Result<Option<RunDecision>, StoreError> {
        let limits = match FeedLimitStore::get(&self.pool, feed_id).await? {
            Some(limits) => limits,
            None => return Ok(None),
        };

        if limits.emergency_stopped {
            return Ok(Some(RunDecision::Rejected {
                kind: ErrorKind::LimitExceeded,
                message: format!("feed {} is emergency-stopped", feed_id),
            }));
        }

        let now = self.clock.now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let (runs_today, cost_today) =
            RunStore::feed_usage_since(&self.pool, feed_id, day_start).await?;

        if let Some(max_runs) = limits.max_daily_runs {
            if runs_today >= max_runs as i64 {
                return Ok(Some(RunDecision::Rejected {
                    kind: ErrorKind::LimitExceeded,
                    message: format!("feed {} daily analysis cap reached", feed_id),
                }));
            }
        }
        if let Some(max_cost) = limits.max_daily_cost {
            if let Some(threshold) = limits.alert_threshold {
                if cost_today >= max_cost * threshold && cost_today < max_cost {
                    warn!(
                        feed_id = %feed_id,
                        cost_today = cost_today,
                        max_daily_cost = max_cost,
                        "feed is approaching its daily cost cap"
                    );
                }
            }
            if cost_today >= max_cost {
                if limits.auto_disable {
                    warn!(feed_id = %feed_id, "daily cost cap breached — disabling auto-analysis");
                    let _ = newswire_store::FeedStore::update(
                        &self.pool,
                        feed_id,
                        newswire_store::UpdateFeed {
                            auto_analyze: Some(false),
                            ..Default::default()
                        },
                    )
                    .await;
                }
                return Ok(Some(RunDecision::Rejected {
                    kind: ErrorKind::LimitExceeded,
                    message: format!("feed {} daily cost cap reached", feed_id),
                }));
            }
        }
        if let Some(max_cost) = limits.max_monthly_cost {
            let month_start = day_start - Duration::days(30);
            let (_, cost_month) =
                RunStore::feed_usage_since(&self.pool, feed_id, month_start).await?;
            if cost_month >= max_cost {
                return Ok(Some(RunDecision::Rejected {
                    kind: ErrorKind::LimitExceeded,
                    message: format!("feed {} monthly cost cap reached", feed_id),
                }));
            }
        }

        Ok(None)
    }

    /// Start slack: concurrency below cap and hourly start budget left.
    async fn can_start_now(&self) -> Result<bool, StoreError> {
        let active = RunStore::active_count(&self.pool).await?;
        if active >= self.config.max_concurrent_runs as i64 {
            return Ok(false);
        }
        let hour_ago = self.clock.now() - Duration::hours(1);
        let started = RunStore::started_since(&self.pool, hour_ago).await?;
        Ok(started < self.config.max_runs_per_hour as i64)
    }

    /// Periodic pass: resume breaker-paused runs, then drain the FIFO
    /// queue while slack remains.
    pub async fn process_queue(&self) -> Result<(), StoreError> {
        if self.is_halted() {
            return Ok(());
        }

        // Paused runs resume first; their budget was spent at start time.
        if self.orchestrator.breaker().allow_request() {
            for run_id in RunStore::paused_ids(&self.pool).await? {
                if RunStore::active_count(&self.pool).await?
                    > self.config.max_concurrent_runs as i64
                {
                    break;
                }
                info!(run_id = %run_id, "resuming paused run");
                Arc::clone(&self.orchestrator).spawn_run(run_id);
            }
        }

        while self.can_start_now().await? {
            let queued = match QueuedRunStore::dequeue_front(&self.pool).await? {
                Some(queued) => queued,
                None => break,
            };
            // A queued run cancelled while waiting just disappears here.
            match RunStore::status(&self.pool, queued.run_id).await? {
                Some(status) if status.is_terminal() => continue,
                None => continue,
                Some(_) => {}
            }
            info!(run_id = %queued.run_id, "starting queued run");
            Arc::clone(&self.orchestrator).spawn_run(queued.run_id);
        }

        Ok(())
    }

    /// Request cancellation. Queued runs terminalize immediately; running
    /// runs observe the bit at their next item boundary.
    pub async fn cancel(&self, run_id: Uuid) -> Result<(), StoreError> {
        let run = RunStore::request_cancel(&self.pool, run_id).await?;

        if QueuedRunStore::remove(&self.pool, run_id).await? || run.status == RunStatus::Pending {
            let now = self.clock.now();
            RunItemStore::cancel_queued(&self.pool, run_id, now).await?;
            RunStore::finish(&self.pool, run_id, RunStatus::Cancelled, None, now).await?;
            info!(run_id = %run_id, "queued run cancelled");
        } else if run.status == RunStatus::Paused {
            // Nothing is executing; terminalize in place.
            let now = self.clock.now();
            RunItemStore::cancel_queued(&self.pool, run_id, now).await?;
            RunStore::finish(&self.pool, run_id, RunStatus::Cancelled, None, now).await?;
            info!(run_id = %run_id, "paused run cancelled");
        } else {
            info!(run_id = %run_id, "cancellation requested");
        }
        Ok(())
    }

    /// Global halt: reject new runs, hold the queue, pause running runs at
    /// their next item check.
    pub async fn emergency_stop(&self) -> Result<(), StoreError> {
        self.halt.store(true, Ordering::Relaxed);
        let held = QueuedRunStore::hold_all(&self.pool).await?;
        warn!(held_runs = held, "emergency stop engaged");
        Ok(())
    }

    /// Lift the halt and restore the held queue in original order.
    pub async fn resume(&self) -> Result<(), StoreError> {
        self.halt.store(false, Ordering::Relaxed);
        let released = QueuedRunStore::release_all(&self.pool).await?;
        info!(released_runs = released, "emergency stop lifted");
        Ok(())
    }

    pub async fn status(&self) -> Result<GovernorStatus, StoreError> {
        let now = self.clock.now();
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(now);
        let hour_start = now - Duration::hours(1);

        Ok(GovernorStatus {
            halted: self.is_halted(),
            max_runs_per_day: self.config.max_runs_per_day,
            max_auto_runs_per_day: self.config.max_auto_runs_per_day,
            max_runs_per_hour: self.config.max_runs_per_hour,
            max_concurrent_runs: self.config.max_concurrent_runs,
            runs_today: RunStore::count_since(&self.pool, day_start, None).await?,
            auto_runs_today: RunStore::count_since(&self.pool, day_start, Some(TriggerSource::Auto))
                .await?,
            runs_started_this_hour: RunStore::started_since(&self.pool, hour_start).await?,
            active_runs: RunStore::active_count(&self.pool).await?,
            queue_depth: QueuedRunStore::depth(&self.pool).await?,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_request_defaults() {
        let json = r#"{"scope": {"type": "latest", "count": 5}}"#;
        let request: RunRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.trigger, TriggerSource::Api);
        assert_eq!(request.params.limit, 200);
        assert!(!request.params.override_existing);
    }

    #[test]
    fn test_run_request_roundtrip() {
        let request = RunRequest {
            scope: RunScope::Latest { count: 10 },
            params: RunParams::default(),
            trigger: TriggerSource::Manual,
        };
        let json = serde_json::to_value(&request).unwrap();
        let parsed: RunRequest = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.trigger, TriggerSource::Manual);
        assert!(matches!(parsed.scope, RunScope::Latest { count: 10 }));
    }
}
