//! Adaptive token-bucket rate limiter in front of the LLM provider.
//!
//! Refill is computed lazily from the injected clock. Outcomes feed a
//! fixed-size observation window; a bad window (error rate over threshold
//! with a live failure streak) cuts the rate 25%, a clean window recovers
//! it 10% toward the configured rate. Changes are smooth, never jumps.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use newswire_core::config::LimiterConfig;
use newswire_core::Clock;

/// Observations per adaptation window.
const WINDOW_SIZE: u32 = 10;

/// Observable limiter state for metrics and the manager API.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterSnapshot {
    pub configured_rate: f64,
    pub current_rate: f64,
    pub min_rate: f64,
    pub burst: u32,
    pub tokens_available: f64,
    pub window_failures: u32,
    pub consecutive_failures: u32,
}

struct Inner {
    tokens: f64,
    last_refill: DateTime<Utc>,
    current_rate: f64,
    window_successes: u32,
    window_failures: u32,
    consecutive_failures: u32,
}

pub struct AdaptiveRateLimiter {
    config: LimiterConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl AdaptiveRateLimiter {
    pub fn new(config: LimiterConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let burst = config.burst as f64;
        Self {
            inner: Mutex::new(Inner {
                tokens: burst,
                last_refill: now,
                current_rate: config.rate_per_second,
                window_successes: 0,
                window_failures: 0,
                consecutive_failures: 0,
            }),
            config,
            clock,
        }
    }

    fn refill(&self, inner: &mut Inner) {
        let now = self.clock.now();
        let elapsed = (now - inner.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        inner.tokens =
            (inner.tokens + elapsed * inner.current_rate).min(self.config.burst as f64);
        inner.last_refill = now;
    }

    /// Take one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        self.refill(&mut inner);
        if inner.tokens >= 1.0 {
            inner.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Block up to `timeout` for one token. Returns false on timeout. With
    /// at least one token slot and a non-zero rate this always makes
    /// progress, so callers cannot deadlock on a min-rate limiter.
    pub async fn acquire(&self, timeout: StdDuration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.try_acquire() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            let wait = {
                let inner = self.inner.lock().unwrap();
                // Time until the next full token at the current rate.
                let deficit = (1.0 - inner.tokens).max(0.0);
                StdDuration::from_millis(((deficit / inner.current_rate) * 1000.0) as u64 + 5)
            };
            tokio::time::sleep(wait.min(StdDuration::from_millis(250))).await;
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.window_successes += 1;
        inner.consecutive_failures = 0;
        self.maybe_adapt(&mut inner);
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.window_failures += 1;
        inner.consecutive_failures += 1;
        self.maybe_adapt(&mut inner);
    }

    /// Evaluate the window once it fills: reduce on a bad window, recover
    /// on a clean one, and start the next window either way.
    fn maybe_adapt(&self, inner: &mut Inner) {
        let observations = inner.window_successes + inner.window_failures;
        if observations < WINDOW_SIZE {
            return;
        }

        let error_rate = inner.window_failures as f64 / observations as f64;
        let before = inner.current_rate;

        if error_rate > self.config.error_threshold
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            inner.current_rate = (inner.current_rate * 0.75).max(self.config.min_rate);
        } else if inner.window_failures == 0 {
            inner.current_rate =
                (inner.current_rate * 1.10).min(self.config.rate_per_second);
        }

        if (inner.current_rate - before).abs() > f64::EPSILON {
            info!(
                from = before,
                to = inner.current_rate,
                error_rate = error_rate,
                "rate limiter adapted"
            );
        }

        inner.window_successes = 0;
        inner.window_failures = 0;
    }

    pub fn current_rate(&self) -> f64 {
        self.inner.lock().unwrap().current_rate
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let mut inner = self.inner.lock().unwrap();
        self.refill(&mut inner);
        LimiterSnapshot {
            configured_rate: self.config.rate_per_second,
            current_rate: inner.current_rate,
            min_rate: self.config.min_rate,
            burst: self.config.burst,
            tokens_available: inner.tokens,
            window_failures: inner.window_failures,
            consecutive_failures: inner.consecutive_failures,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use newswire_core::ManualClock;

    fn test_config() -> LimiterConfig {
        LimiterConfig {
            rate_per_second: 2.0,
            burst: 5,
            min_rate: 0.5,
            acquire_timeout_seconds: 5,
            error_threshold: 0.2,
            failure_threshold: 3,
        }
    }

    fn limiter_with_clock() -> (AdaptiveRateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = AdaptiveRateLimiter::new(test_config(), clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_burst_then_exhaustion() {
        let (limiter, _clock) = limiter_with_clock();
        for _ in 0..5 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refill_over_time() {
        let (limiter, clock) = limiter_with_clock();
        for _ in 0..5 {
            limiter.try_acquire();
        }
        assert!(!limiter.try_acquire());

        // 2 tokens/sec: one second buys two tokens.
        clock.advance(Duration::seconds(1));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let (limiter, clock) = limiter_with_clock();
        clock.advance(Duration::hours(1));
        let snapshot = limiter.snapshot();
        assert!((snapshot.tokens_available - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_bad_window_reduces_rate() {
        let (limiter, _clock) = limiter_with_clock();
        // 6 successes, then 4 consecutive failures: 40% error rate with a
        // streak of 4 at window close.
        for _ in 0..6 {
            limiter.record_success();
        }
        for _ in 0..4 {
            limiter.record_failure();
        }
        assert!((limiter.current_rate() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_floor() {
        let (limiter, _clock) = limiter_with_clock();
        for _ in 0..200 {
            limiter.record_failure();
        }
        assert!(limiter.current_rate() >= 0.5);
    }

    #[test]
    fn test_clean_window_recovers_toward_configured() {
        let (limiter, _clock) = limiter_with_clock();
        // Knock the rate down first.
        for _ in 0..6 {
            limiter.record_success();
        }
        for _ in 0..4 {
            limiter.record_failure();
        }
        let reduced = limiter.current_rate();
        assert!(reduced < 2.0);

        // Two clean windows recover 10% each, capped at configured.
        for _ in 0..20 {
            limiter.record_success();
        }
        let recovered = limiter.current_rate();
        assert!(recovered > reduced);
        assert!(recovered <= 2.0);
    }

    #[test]
    fn test_recovery_never_exceeds_configured_rate() {
        let (limiter, _clock) = limiter_with_clock();
        for _ in 0..100 {
            limiter.record_success();
        }
        assert!((limiter.current_rate() - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_token() {
        let clock = Arc::new(newswire_core::SystemClock);
        let limiter = AdaptiveRateLimiter::new(
            LimiterConfig {
                rate_per_second: 50.0,
                burst: 1,
                min_rate: 0.5,
                acquire_timeout_seconds: 1,
                error_threshold: 0.2,
                failure_threshold: 3,
            },
            clock,
        );

        assert!(limiter.acquire(StdDuration::from_secs(1)).await);
        // Bucket drained; the next acquire must wait for refill but still
        // succeed well inside the timeout at 50 tokens/sec.
        assert!(limiter.acquire(StdDuration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_acquire_times_out_at_zero_effective_rate() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = AdaptiveRateLimiter::new(test_config(), clock);
        for _ in 0..5 {
            limiter.try_acquire();
        }
        // Manual clock never advances, so no refill can happen.
        assert!(!limiter.acquire(StdDuration::from_millis(50)).await);
    }
}
