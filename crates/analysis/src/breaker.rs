//! Circuit breaker around the LLM provider.
//!
//! CLOSED admits everything and tracks an exponentially decayed error
//! rate. Sustained failure opens the circuit; after the cooldown a
//! half-open probe phase decides between closing again and renewing the
//! cooldown.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use newswire_core::config::BreakerConfig;
use newswire_core::Clock;

/// Exponential-decay factor per observation for the rolling error rate.
const DECAY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Observable breaker state for metrics and the manager API.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub transitions: u64,
    /// Seconds until a probe is admitted; zero unless OPEN.
    pub cooldown_remaining_seconds: i64,
}

struct Inner {
    state: CircuitState,
    error_rate: f64,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    half_open_successes: u32,
    transitions: u64,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                error_rate: 0.0,
                consecutive_failures: 0,
                opened_at: None,
                half_open_successes: 0,
                transitions: 0,
            }),
        }
    }

    /// Whether a request may proceed right now. An OPEN breaker whose
    /// cooldown has elapsed transitions to HALF_OPEN and admits a probe.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooldown = Duration::seconds(self.config.cooldown_seconds as i64);
                let elapsed = inner
                    .opened_at
                    .map(|at| self.clock.now() - at)
                    .unwrap_or_else(Duration::zero);
                if elapsed >= cooldown {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_successes = 0;
                    inner.transitions += 1;
                    info!("circuit breaker: OPEN -> HALF_OPEN (probe admitted)");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.error_rate *= DECAY;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.config.probe_success_threshold {
                inner.state = CircuitState::Closed;
                inner.opened_at = None;
                inner.transitions += 1;
                info!("circuit breaker: HALF_OPEN -> CLOSED");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.error_rate = inner.error_rate * DECAY + (1.0 - DECAY);
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(self.clock.now());
                inner.transitions += 1;
                warn!("circuit breaker: HALF_OPEN -> OPEN (probe failed, cooldown renewed)");
            }
            CircuitState::Closed => {
                if inner.error_rate > self.config.error_threshold
                    && inner.consecutive_failures >= self.config.failure_threshold
                {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(self.clock.now());
                    inner.transitions += 1;
                    warn!(
                        error_rate = inner.error_rate,
                        consecutive_failures = inner.consecutive_failures,
                        "circuit breaker: CLOSED -> OPEN"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.lock().unwrap();
        let cooldown_remaining = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => {
                let cooldown = Duration::seconds(self.config.cooldown_seconds as i64);
                (cooldown - (self.clock.now() - at)).num_seconds().max(0)
            }
            _ => 0,
        };
        BreakerSnapshot {
            state: inner.state,
            error_rate: inner.error_rate,
            consecutive_failures: inner.consecutive_failures,
            transitions: inner.transitions,
            cooldown_remaining_seconds: cooldown_remaining,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use newswire_core::ManualClock;

    fn test_config() -> BreakerConfig {
        BreakerConfig {
            error_threshold: 0.2,
            failure_threshold: 3,
            cooldown_seconds: 30,
            probe_success_threshold: 3,
        }
    }

    fn breaker_with_clock() -> (CircuitBreaker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let breaker = CircuitBreaker::new(test_config(), clock.clone());
        (breaker, clock)
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let (breaker, _clock) = breaker_with_clock();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_opens_on_sustained_failure() {
        let (breaker, _clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.allow_request());
    }

    #[test]
    fn test_isolated_failures_do_not_trip() {
        let (breaker, _clock) = breaker_with_clock();
        // Failures interleaved with successes never build the streak.
        for _ in 0..10 {
            breaker.record_failure();
            breaker.record_success();
            breaker.record_failure();
            breaker.record_success();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert!(!breaker.allow_request());

        clock.advance(Duration::seconds(31));
        assert!(breaker.allow_request());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_probe_successes_close() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(Duration::seconds(31));
        assert!(breaker.allow_request());

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_probe_failure_reopens_and_renews_cooldown() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(Duration::seconds(31));
        assert!(breaker.allow_request());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // Old cooldown elapsed time does not count; a fresh one started.
        clock.advance(Duration::seconds(10));
        assert!(!breaker.allow_request());
        clock.advance(Duration::seconds(21));
        assert!(breaker.allow_request());
    }

    #[test]
    fn test_snapshot_reports_cooldown_remaining() {
        let (breaker, clock) = breaker_with_clock();
        for _ in 0..5 {
            breaker.record_failure();
        }
        clock.advance(Duration::seconds(10));
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(snapshot.cooldown_remaining_seconds > 0);
        assert!(snapshot.cooldown_remaining_seconds <= 20);
        assert!(snapshot.transitions >= 1);
    }
}
