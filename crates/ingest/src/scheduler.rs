//! Adaptive feed scheduler.
//!
//! A single poll loop selects due feeds, dispatches them to bounded fetch
//! tasks, and folds every outcome back into the feed row, fetch log, and
//! health. Failing feeds back off exponentially but are never auto-paused;
//! pausing is an operator decision.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use newswire_core::config::FetchConfig;
use newswire_core::{Clock, Feed, FeedStatus, FetchOutcome};
use newswire_store::{FeedHealthStore, FeedStore, FetchLogStore, FetchRecord};

use crate::fetcher::Fetcher;
use crate::pipeline::{ingest_payload, AutoEnrolSender};

/// Cap on any computed interval.
fn max_backoff() -> Duration {
    Duration::hours(24)
}

/// Liveness + workload snapshot for `GET /scheduler/heartbeat`.
#[derive(Debug, Serialize)]
pub struct HeartbeatSnapshot {
    pub alive_at: DateTime<Utc>,
    pub paused: bool,
    pub in_flight: usize,
    pub due_now: i64,
    pub fetches_dispatched: u64,
    pub fetches_timed_out: u64,
    pub upcoming: Vec<UpcomingFetch>,
}

#[derive(Debug, Serialize)]
pub struct UpcomingFetch {
    pub feed_id: Uuid,
    pub title: String,
    pub next_fetch_at: Option<DateTime<Utc>>,
}

pub struct FeedScheduler {
    pool: PgPool,
    fetcher: Arc<Fetcher>,
    config: FetchConfig,
    clock: Arc<dyn Clock>,
    intake: AutoEnrolSender,
    paused: AtomicBool,
    /// feed id → dispatch time; doubles as the stale-fetch guard.
    in_flight: Mutex<HashMap<Uuid, DateTime<Utc>>>,
    dispatched_total: AtomicU64,
    timeouts_total: AtomicU64,
}

impl FeedScheduler {
    pub fn new(
        pool: PgPool,
        fetcher: Arc<Fetcher>,
        config: FetchConfig,
        clock: Arc<dyn Clock>,
        intake: AutoEnrolSender,
    ) -> Self {
        Self {
            pool,
            fetcher,
            config,
            clock,
            intake,
            paused: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
            dispatched_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
        }
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        info!("feed scheduler paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        info!("feed scheduler resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    /// Run the scheduler loop until `stop` is set.
    pub async fn run(self: Arc<Self>, stop: Arc<AtomicBool>) {
        let tick_interval = StdDuration::from_secs(self.config.heartbeat_interval_seconds.min(60));
        info!(
            "feed scheduler started (tick: {}s, max_concurrent: {})",
            tick_interval.as_secs(),
            self.config.max_concurrent_fetches
        );

        while !stop.load(Ordering::Relaxed) {
            self.reap_stale().await;
            Arc::clone(&self).tick().await;
            tokio::time::sleep(tick_interval).await;
        }

        info!("feed scheduler stopped");
    }

    /// One scheduling pass: dispatch due feeds up to the concurrency cap.
    pub async fn tick(self: Arc<Self>) {
        if self.is_paused() {
            return;
        }

        let now = self.clock.now();
        let slots = {
            let in_flight = self.in_flight.lock().unwrap();
            (self.config.max_concurrent_fetches as usize).saturating_sub(in_flight.len())
        };
        if slots == 0 {
            return;
        }

        let due = match FeedStore::due(&self.pool, now, slots as i64 * 2).await {
            Ok(feeds) => feeds,
            Err(e) => {
                warn!(error = %e, "scheduler: failed to query due feeds");
                return;
            }
        };

        let mut dispatched = 0usize;
        for feed in due {
            if dispatched >= slots {
                break;
            }
            // Serial per feed: never two concurrent fetches of one feed.
            {
                let mut in_flight = self.in_flight.lock().unwrap();
                if in_flight.contains_key(&feed.id) {
                    continue;
                }
                in_flight.insert(feed.id, now);
            }
            dispatched += 1;
            self.dispatched_total.fetch_add(1, Ordering::Relaxed);

            let scheduler = Arc::clone(&self);
            tokio::spawn(async move {
                scheduler.fetch_feed(feed).await;
            });
        }
    }

    /// Fetch one feed and record the outcome. Never returns an error; every
    /// failure path ends in fetch-log + health bookkeeping.
    async fn fetch_feed(self: Arc<Self>, feed: Feed) {
        let started = self.clock.now();

        let (outcome, items_found, items_new, failures, error_message) =
            match self.fetcher.fetch(&feed.url).await {
                Ok(payload) => {
                    match ingest_payload(&self.pool, &feed, &payload, Some(&self.intake)).await {
                        Ok(result) => {
                            let outcome = if result.items_found == 0 {
                                FetchOutcome::Empty
                            } else {
                                FetchOutcome::Success
                            };
                            let error = (!result.failures.is_empty())
                                .then(|| result.failures.join(", "));
                            (outcome, result.items_found, result.items_new, result.failures.len(), error)
                        }
                        Err(e) => (FetchOutcome::Error, 0, 0, 0, Some(e.to_string())),
                    }
                }
                Err(e) if e.is_timeout() => (FetchOutcome::Timeout, 0, 0, 0, Some(e.to_string())),
                Err(e) => (FetchOutcome::Error, 0, 0, 0, Some(e.to_string())),
            };

        if failures > 0 {
            warn!(
                feed_id = %feed.id,
                rejected = failures,
                "some entries were rejected during extraction"
            );
        }

        self.on_fetch_result(feed, started, outcome, items_found, items_new, error_message)
            .await;
    }

    /// Fold one fetch outcome into the store. The stale guard drops results
    /// whose in-flight slot was already reaped.
    async fn on_fetch_result(
        &self,
        feed: Feed,
        started: DateTime<Utc>,
        outcome: FetchOutcome,
        items_found: i32,
        items_new: i32,
        error_message: Option<String>,
    ) {
        let completed = self.clock.now();

        {
            let mut in_flight = self.in_flight.lock().unwrap();
            match in_flight.get(&feed.id) {
                Some(dispatched_at) if *dispatched_at <= started => {
                    in_flight.remove(&feed.id);
                }
                _ => {
                    info!(feed_id = %feed.id, "dropping stale fetch result");
                    return;
                }
            }
        }

        let success = matches!(outcome, FetchOutcome::Success | FetchOutcome::Empty);
        let consecutive_failures = if success {
            0
        } else {
            feed.consecutive_failures + 1
        };

        let record = FetchRecord {
            feed_id: feed.id,
            started_at: started,
            completed_at: completed,
            outcome,
            items_found,
            items_new,
            error_message,
            response_time_ms: (completed - started).num_milliseconds(),
        };
        if let Err(e) = FetchLogStore::append(&self.pool, &record).await {
            warn!(feed_id = %feed.id, error = %e, "failed to append fetch log");
        }

        let activity = if success {
            let since = completed - Duration::hours(24);
            match FetchLogStore::items_new_since(&self.pool, feed.id, since).await {
                Ok(new_items) => activity_factor(new_items),
                Err(_) => 1.0,
            }
        } else {
            1.0
        };

        let jitter = rand::thread_rng().gen_range(0.9..1.1);
        let next_in = compute_next_interval(
            feed.interval_minutes,
            consecutive_failures,
            success,
            activity,
            jitter,
        );

        let status = if consecutive_failures >= self.config.error_threshold as i32 {
            FeedStatus::Error
        } else if feed.status == FeedStatus::Error {
            // Recovered; back to the active rotation.
            FeedStatus::Active
        } else {
            feed.status
        };

        if !success {
            self.timeouts_total
                .fetch_add(matches!(outcome, FetchOutcome::Timeout) as u64, Ordering::Relaxed);
        }

        if let Err(e) = FeedStore::record_fetch(
            &self.pool,
            feed.id,
            status,
            consecutive_failures,
            completed + next_in,
            completed,
        )
        .await
        {
            warn!(feed_id = %feed.id, error = %e, "failed to record fetch on feed row");
        }

        if let Err(e) = FeedHealthStore::refresh_after_fetch(
            &self.pool,
            feed.id,
            success,
            consecutive_failures,
            completed,
        )
        .await
        {
            warn!(feed_id = %feed.id, error = %e, "failed to refresh feed health");
        }
    }

    /// Abandon in-flight fetches older than the stale timeout: release the
    /// slot, log a timeout, and back the feed off. A late result from the
    /// abandoned task is dropped by the stale guard.
    async fn reap_stale(&self) {
        let now = self.clock.now();
        let stale_cutoff = now - Duration::seconds(self.config.stale_timeout_seconds as i64);

        let stale: Vec<(Uuid, DateTime<Utc>)> = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let stale: Vec<(Uuid, DateTime<Utc>)> = in_flight
                .iter()
                .filter(|(_, dispatched)| **dispatched < stale_cutoff)
                .map(|(id, dispatched)| (*id, *dispatched))
                .collect();
            for (id, _) in &stale {
                in_flight.remove(id);
            }
            stale
        };

        for (feed_id, dispatched_at) in stale {
            warn!(feed_id = %feed_id, "abandoning stale in-flight fetch");
            self.timeouts_total.fetch_add(1, Ordering::Relaxed);

            let feed = match FeedStore::get(&self.pool, feed_id).await {
                Ok(Some(feed)) => feed,
                _ => continue,
            };

            let consecutive_failures = feed.consecutive_failures + 1;
            let record = FetchRecord {
                feed_id,
                started_at: dispatched_at,
                completed_at: now,
                outcome: FetchOutcome::Timeout,
                items_found: 0,
                items_new: 0,
                error_message: Some("stale fetch abandoned".to_string()),
                response_time_ms: (now - dispatched_at).num_milliseconds(),
            };
            if let Err(e) = FetchLogStore::append(&self.pool, &record).await {
                warn!(feed_id = %feed_id, error = %e, "failed to log stale fetch");
            }

            let jitter = rand::thread_rng().gen_range(0.9..1.1);
            let next_in = compute_next_interval(
                feed.interval_minutes,
                consecutive_failures,
                false,
                1.0,
                jitter,
            );
            let status = if consecutive_failures >= self.config.error_threshold as i32 {
                FeedStatus::Error
            } else {
                feed.status
            };
            let _ = FeedStore::record_fetch(
                &self.pool,
                feed_id,
                status,
                consecutive_failures,
                now + next_in,
                now,
            )
            .await;
            let _ = FeedHealthStore::refresh_after_fetch(
                &self.pool,
                feed_id,
                false,
                consecutive_failures,
                now,
            )
            .await;
        }
    }

    pub async fn heartbeat(&self) -> HeartbeatSnapshot {
        let now = self.clock.now();
        let due_now = FeedStore::due(&self.pool, now, 1000)
            .await
            .map(|feeds| feeds.len() as i64)
            .unwrap_or(0);
        let upcoming = FeedStore::upcoming(&self.pool, 5)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|feed| UpcomingFetch {
                feed_id: feed.id,
                title: feed.title,
                next_fetch_at: feed.next_fetch_at,
            })
            .collect();

        HeartbeatSnapshot {
            alive_at: now,
            paused: self.is_paused(),
            in_flight: self.in_flight_count(),
            due_now,
            fetches_dispatched: self.dispatched_total.load(Ordering::Relaxed),
            fetches_timed_out: self.timeouts_total.load(Ordering::Relaxed),
            upcoming,
        }
    }
}

// ── Interval policy ──────────────────────────────────────────────────

/// Activity-based interval multiplier: quiet feeds stretch out, busy feeds
/// tighten up, clamped to 0.5×..2× of the configured base.
pub fn activity_factor(items_new_last_24h: i64) -> f64 {
    let factor: f64 = match items_new_last_24h {
        0 => 2.0,
        1..=5 => 1.25,
        6..=20 => 1.0,
        _ => 0.5,
    };
    factor.clamp(0.5, 2.0)
}

/// Next-fetch interval. Success uses the base interval scaled by activity;
/// after five consecutive failures the base doubles per further failure up
/// to 8×. Everything is jittered and capped at 24 hours.
pub fn compute_next_interval(
    base_minutes: i32,
    consecutive_failures: i32,
    success: bool,
    activity: f64,
    jitter: f64,
) -> Duration {
    let base = Duration::minutes(base_minutes.max(1) as i64);

    let scaled_minutes = if success {
        base.num_minutes() as f64 * activity.clamp(0.5, 2.0)
    } else if consecutive_failures >= 5 {
        let exponent = (consecutive_failures - 5).min(3) as u32;
        base.num_minutes() as f64 * 2_f64.powi(exponent as i32)
    } else {
        base.num_minutes() as f64
    };

    let jittered = Duration::seconds((scaled_minutes * 60.0 * jitter) as i64);
    jittered.min(max_backoff())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_interval_is_base_with_jitter() {
        let interval = compute_next_interval(60, 0, true, 1.0, 1.0);
        assert_eq!(interval, Duration::minutes(60));

        let low = compute_next_interval(60, 0, true, 1.0, 0.9);
        let high = compute_next_interval(60, 0, true, 1.0, 1.1);
        assert!(low < interval && interval < high);
    }

    #[test]
    fn test_early_failures_stay_at_base() {
        for failures in 1..5 {
            let interval = compute_next_interval(30, failures, false, 1.0, 1.0);
            assert_eq!(interval, Duration::minutes(30), "failures={}", failures);
        }
    }

    #[test]
    fn test_backoff_doubles_from_fifth_failure() {
        assert_eq!(
            compute_next_interval(30, 5, false, 1.0, 1.0),
            Duration::minutes(30)
        );
        assert_eq!(
            compute_next_interval(30, 6, false, 1.0, 1.0),
            Duration::minutes(60)
        );
        assert_eq!(
            compute_next_interval(30, 7, false, 1.0, 1.0),
            Duration::minutes(120)
        );
        assert_eq!(
            compute_next_interval(30, 8, false, 1.0, 1.0),
            Duration::minutes(240)
        );
        // Exponent caps at 3.
        assert_eq!(
            compute_next_interval(30, 20, false, 1.0, 1.0),
            Duration::minutes(240)
        );
    }

    #[test]
    fn test_backoff_capped_at_24h() {
        let interval = compute_next_interval(1440, 20, false, 1.0, 1.1);
        assert_eq!(interval, Duration::hours(24));
    }

    #[test]
    fn test_activity_factor_bounds() {
        assert_eq!(activity_factor(0), 2.0);
        assert_eq!(activity_factor(3), 1.25);
        assert_eq!(activity_factor(10), 1.0);
        assert_eq!(activity_factor(100), 0.5);
    }

    #[test]
    fn test_activity_scales_success_interval_within_clamp() {
        let quiet = compute_next_interval(60, 0, true, 2.0, 1.0);
        let busy = compute_next_interval(60, 0, true, 0.5, 1.0);
        assert_eq!(quiet, Duration::minutes(120));
        assert_eq!(busy, Duration::minutes(30));

        // Out-of-range factors are clamped.
        let clamped = compute_next_interval(60, 0, true, 10.0, 1.0);
        assert_eq!(clamped, Duration::minutes(120));
    }

    #[test]
    fn test_activity_ignored_on_failure() {
        let interval = compute_next_interval(60, 6, false, 0.5, 1.0);
        assert_eq!(interval, Duration::minutes(120));
    }
}
