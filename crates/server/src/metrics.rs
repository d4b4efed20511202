//! Prometheus instrumentation.
//!
//! Gauges are refreshed from component snapshots and store aggregates by
//! a periodic task; counters advance by the delta of the underlying
//! totals between refreshes, so restarts reset them the way Prometheus
//! expects. Histogram observations cover run items and auto batches that
//! became terminal since the previous pass.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use sqlx::PgPool;
use tracing::warn;

use newswire_analysis::{BreakerSnapshot, CircuitState, LimiterSnapshot, SemaphoreSnapshot};

/// Totals remembered between refreshes for counter deltas and histogram
/// high-water marks.
#[derive(Default)]
struct RefreshState {
    item_totals: HashMap<String, i64>,
    fetch_totals: HashMap<String, i64>,
    call_totals: HashMap<(String, String), i64>,
    error_totals: HashMap<String, i64>,
    last_item_mark: Option<DateTime<Utc>>,
    last_batch_mark: Option<DateTime<Utc>>,
}

pub struct Metrics {
    registry: Registry,

    items_processed: IntCounterVec,
    feeds_fetched: IntCounterVec,
    llm_api_calls: IntCounterVec,
    errors: IntCounterVec,

    queue_depth: IntGauge,
    active_items: IntGauge,
    queue_utilization: Gauge,
    breaker_state: GaugeVec,
    limiter_rate: Gauge,
    pending_auto: IntGauge,
    analyzed_ratio: Gauge,

    analysis_duration: Histogram,
    llm_request_duration: HistogramVec,
    queue_wait: Histogram,
    batch_size: Histogram,
    fetch_lag: Histogram,

    state: Mutex<RefreshState>,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let items_processed = IntCounterVec::new(
            Opts::new("newswire_items_processed_total", "Run items by terminal state"),
            &["state"],
        )?;
        let feeds_fetched = IntCounterVec::new(
            Opts::new("newswire_feeds_fetched_total", "Feed fetches by outcome"),
            &["outcome"],
        )?;
        let llm_api_calls = IntCounterVec::new(
            Opts::new("newswire_llm_api_calls_total", "LLM calls by model and status"),
            &["model", "status"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("newswire_errors_total", "Classified errors by kind"),
            &["kind"],
        )?;

        let queue_depth = IntGauge::new("newswire_run_queue_depth", "Queued runs waiting for capacity")?;
        let active_items = IntGauge::new("newswire_active_items", "In-flight classifications")?;
        let queue_utilization = Gauge::new(
            "newswire_queue_utilization_percent",
            "Analysis slot utilization percent",
        )?;
        let breaker_state = GaugeVec::new(
            Opts::new(
                "newswire_circuit_breaker_state",
                "Breaker state (0=closed, 1=half_open, 2=open)",
            ),
            &["component"],
        )?;
        let limiter_rate = Gauge::new(
            "newswire_limiter_current_rate",
            "Current adaptive limiter rate (tokens/sec)",
        )?;
        let pending_auto = IntGauge::new(
            "newswire_pending_auto_batches",
            "Open auto-analysis batches",
        )?;
        let analyzed_ratio = Gauge::new(
            "newswire_analyzed_ratio",
            "Share of items with a stored analysis",
        )?;

        let analysis_duration = Histogram::with_opts(
            HistogramOpts::new(
                "newswire_analysis_duration_seconds",
                "Per-item classification wall time",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;
        let llm_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "newswire_llm_request_duration_seconds",
                "LLM request wall time by model",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
            &["model"],
        )?;
        let queue_wait = Histogram::with_opts(
            HistogramOpts::new(
                "newswire_queue_wait_seconds",
                "Delay between run start and item dispatch",
            )
            .buckets(vec![1.0, 5.0, 15.0, 60.0, 300.0, 900.0]),
        )?;
        let batch_size = Histogram::with_opts(
            HistogramOpts::new("newswire_auto_batch_size", "Auto-analysis batch sizes")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 200.0]),
        )?;
        let fetch_lag = Histogram::with_opts(
            HistogramOpts::new(
                "newswire_feed_fetch_lag_minutes",
                "Minutes since each active feed was last fetched",
            )
            .buckets(vec![5.0, 15.0, 30.0, 60.0, 180.0, 720.0, 1440.0]),
        )?;

        let build_info = IntGaugeVec::new(
            Opts::new("newswire_build_info", "Build metadata"),
            &["version"],
        )?;
        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1);

        registry.register(Box::new(items_processed.clone()))?;
        registry.register(Box::new(feeds_fetched.clone()))?;
        registry.register(Box::new(llm_api_calls.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(active_items.clone()))?;
        registry.register(Box::new(queue_utilization.clone()))?;
        registry.register(Box::new(breaker_state.clone()))?;
        registry.register(Box::new(limiter_rate.clone()))?;
        registry.register(Box::new(pending_auto.clone()))?;
        registry.register(Box::new(analyzed_ratio.clone()))?;
        registry.register(Box::new(analysis_duration.clone()))?;
        registry.register(Box::new(llm_request_duration.clone()))?;
        registry.register(Box::new(queue_wait.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;
        registry.register(Box::new(fetch_lag.clone()))?;
        registry.register(Box::new(build_info))?;

        Ok(Self {
            registry,
            items_processed,
            feeds_fetched,
            llm_api_calls,
            errors,
            queue_depth,
            active_items,
            queue_utilization,
            breaker_state,
            limiter_rate,
            pending_auto,
            analyzed_ratio,
            analysis_duration,
            llm_request_duration,
            queue_wait,
            batch_size,
            fetch_lag,
            state: Mutex::new(RefreshState::default()),
        })
    }

    /// Textual exposition plus its content type.
    pub fn gather(&self) -> (String, String) {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            warn!(error = %e, "metrics encoding failed");
        }
        (
            String::from_utf8(buffer).unwrap_or_default(),
            encoder.format_type().to_string(),
        )
    }

    /// Push component snapshots into the gauges.
    pub fn observe_components(
        &self,
        limiter: &LimiterSnapshot,
        breaker: &BreakerSnapshot,
        semaphore: &SemaphoreSnapshot,
    ) {
        self.limiter_rate.set(limiter.current_rate);
        self.active_items.set(semaphore.active as i64);
        self.queue_utilization.set(semaphore.utilization * 100.0);
        let breaker_value = match breaker.state {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        self.breaker_state
            .with_label_values(&["llm"])
            .set(breaker_value);
    }

    /// Refresh store-derived series. Counter families advance by delta.
    pub async fn refresh_from_store(&self, pool: &PgPool) {
        if let Err(e) = self.refresh_inner(pool).await {
            warn!(error = %e, "metrics refresh failed");
        }
    }

    async fn refresh_inner(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        // Counter deltas.
        let item_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, count(*) FROM run_items GROUP BY state")
                .fetch_all(pool)
                .await?;
        let fetch_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT outcome, count(*) FROM fetch_log GROUP BY outcome")
                .fetch_all(pool)
                .await?;
        let call_rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT r.model_tag, ri.state, count(*)
             FROM run_items ri JOIN analysis_runs r ON r.id = ri.run_id
             WHERE ri.state IN ('completed', 'failed')
             GROUP BY r.model_tag, ri.state",
        )
        .fetch_all(pool)
        .await?;
        let error_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT split_part(error, ':', 1), count(*)
             FROM run_items WHERE state = 'failed' AND error IS NOT NULL
             GROUP BY split_part(error, ':', 1)",
        )
        .fetch_all(pool)
        .await?;

        // Gauges.
        let queue_depth: i64 =
            sqlx::query_scalar("SELECT count(*) FROM queued_runs WHERE NOT held")
                .fetch_one(pool)
                .await?;
        let pending_auto: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM pending_auto_analysis WHERE status IN ('pending', 'processing')",
        )
        .fetch_one(pool)
        .await?;
        let (items, analyses): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM items), (SELECT count(*) FROM item_analyses)",
        )
        .fetch_one(pool)
        .await?;

        self.queue_depth.set(queue_depth);
        self.pending_auto.set(pending_auto);
        self.analyzed_ratio.set(if items > 0 {
            analyses as f64 / items as f64
        } else {
            0.0
        });

        // Fetch lag: one observation per active feed per refresh.
        let lags: Vec<(f64,)> = sqlx::query_as(
            "SELECT (EXTRACT(EPOCH FROM (now() - last_fetched_at)) / 60.0)::float8
             FROM feeds WHERE status = 'active' AND last_fetched_at IS NOT NULL",
        )
        .fetch_all(pool)
        .await?;
        for (lag_minutes,) in lags {
            self.fetch_lag.observe(lag_minutes.max(0.0));
        }

        {
            let mut state = self.state.lock().unwrap();

            for (label, total) in item_rows {
                let previous = state.item_totals.insert(label.clone(), total).unwrap_or(0);
                let delta = (total - previous).max(0);
                if delta > 0 {
                    self.items_processed
                        .with_label_values(&[&label])
                        .inc_by(delta as u64);
                }
            }
            for (label, total) in fetch_rows {
                let previous = state.fetch_totals.insert(label.clone(), total).unwrap_or(0);
                let delta = (total - previous).max(0);
                if delta > 0 {
                    self.feeds_fetched
                        .with_label_values(&[&label])
                        .inc_by(delta as u64);
                }
            }
            for (model, status, total) in call_rows {
                let key = (model.clone(), status.clone());
                let previous = state.call_totals.insert(key, total).unwrap_or(0);
                let delta = (total - previous).max(0);
                if delta > 0 {
                    self.llm_api_calls
                        .with_label_values(&[&model, &status])
                        .inc_by(delta as u64);
                }
            }
            for (kind, total) in error_rows {
                let previous = state.error_totals.insert(kind.clone(), total).unwrap_or(0);
                let delta = (total - previous).max(0);
                if delta > 0 {
                    self.errors.with_label_values(&[&kind]).inc_by(delta as u64);
                }
            }
        }

        // Duration histograms: items that became terminal since last mark.
        let item_mark = {
            let state = self.state.lock().unwrap();
            state.last_item_mark.unwrap_or_else(|| Utc::now() - chrono::Duration::minutes(5))
        };
        let durations: Vec<(String, Option<f64>, Option<f64>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT r.model_tag,
                    EXTRACT(EPOCH FROM (ri.completed_at - ri.started_at))::float8,
                    EXTRACT(EPOCH FROM (ri.started_at - r.started_at))::float8,
                    ri.completed_at
             FROM run_items ri JOIN analysis_runs r ON r.id = ri.run_id
             WHERE ri.state IN ('completed', 'failed')
               AND ri.completed_at IS NOT NULL AND ri.started_at IS NOT NULL
               AND ri.completed_at > $1
             ORDER BY ri.completed_at ASC
             LIMIT 2000",
        )
        .bind(item_mark)
        .fetch_all(pool)
        .await?;
        {
            let mut state = self.state.lock().unwrap();
            for (model, duration, wait, completed_at) in durations {
                if let Some(seconds) = duration {
                    self.analysis_duration.observe(seconds.max(0.0));
                    self.llm_request_duration
                        .with_label_values(&[&model])
                        .observe(seconds.max(0.0));
                }
                if let Some(seconds) = wait {
                    self.queue_wait.observe(seconds.max(0.0));
                }
                state.last_item_mark = Some(completed_at);
            }
        }

        // Auto batch sizes created since last mark.
        let batch_mark = {
            let state = self.state.lock().unwrap();
            state.last_batch_mark.unwrap_or_else(|| Utc::now() - chrono::Duration::minutes(5))
        };
        let batches: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT jsonb_array_length(item_ids), created_at
             FROM pending_auto_analysis WHERE created_at > $1
             ORDER BY created_at ASC LIMIT 2000",
        )
        .bind(batch_mark)
        .fetch_all(pool)
        .await?;
        {
            let mut state = self.state.lock().unwrap();
            for (size, created_at) in batches {
                self.batch_size.observe(size as f64);
                state.last_batch_mark = Some(created_at);
            }
        }

        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_exposes_families() {
        let metrics = Metrics::new().unwrap();
        let (text, content_type) = metrics.gather();
        assert!(content_type.starts_with("text/plain"));
        // Only pre-set series appear before any refresh.
        assert!(text.contains("newswire_build_info"));
    }

    #[test]
    fn test_observe_components_sets_gauges() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_components(
            &LimiterSnapshot {
                configured_rate: 3.0,
                current_rate: 1.5,
                min_rate: 0.5,
                burst: 5,
                tokens_available: 2.0,
                window_failures: 0,
                consecutive_failures: 0,
            },
            &BreakerSnapshot {
                state: CircuitState::Open,
                error_rate: 0.9,
                consecutive_failures: 7,
                transitions: 2,
                cooldown_remaining_seconds: 12,
            },
            &SemaphoreSnapshot {
                capacity: 50,
                active: 10,
                available: 40,
                peak: 12,
                utilization: 0.2,
            },
        );

        let (text, _) = metrics.gather();
        assert!(text.contains("newswire_limiter_current_rate 1.5"));
        assert!(text.contains("newswire_circuit_breaker_state{component=\"llm\"} 2"));
        assert!(text.contains("newswire_active_items 10"));
        assert!(text.contains("newswire_queue_utilization_percent 20"));
    }
}
