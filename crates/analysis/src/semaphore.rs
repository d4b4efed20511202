//! Bounded slot pool for in-flight classifications.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Observable semaphore state for metrics and the manager API.
#[derive(Debug, Clone, Serialize)]
pub struct SemaphoreSnapshot {
    pub capacity: u32,
    pub active: u32,
    pub available: u32,
    pub peak: u32,
    pub utilization: f64,
}

struct Stats {
    active: AtomicU32,
    peak: AtomicU32,
}

/// RAII permit; releasing is dropping.
pub struct AnalysisPermit {
    _permit: OwnedSemaphorePermit,
    stats: Arc<Stats>,
}

impl Drop for AnalysisPermit {
    fn drop(&mut self) {
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
    }
}

pub struct AnalysisSemaphore {
    semaphore: Arc<Semaphore>,
    capacity: u32,
    stats: Arc<Stats>,
}

impl AnalysisSemaphore {
    pub fn new(capacity: u32) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity as usize)),
            capacity,
            stats: Arc::new(Stats {
                active: AtomicU32::new(0),
                peak: AtomicU32::new(0),
            }),
        }
    }

    /// Wait up to `timeout` for a slot.
    pub async fn acquire(&self, timeout: Duration) -> Option<AnalysisPermit> {
        let permit = tokio::time::timeout(timeout, self.semaphore.clone().acquire_owned())
            .await
            .ok()?
            .ok()?;

        let active = self.stats.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.stats.peak.fetch_max(active, Ordering::Relaxed);

        Some(AnalysisPermit {
            _permit: permit,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Pre-flight check for the governor: true when no slot is free.
    pub fn would_block(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    pub fn snapshot(&self) -> SemaphoreSnapshot {
        let active = self.stats.active.load(Ordering::Relaxed);
        SemaphoreSnapshot {
            capacity: self.capacity,
            active,
            available: self.semaphore.available_permits() as u32,
            peak: self.stats.peak.load(Ordering::Relaxed),
            utilization: if self.capacity > 0 {
                active as f64 / self.capacity as f64
            } else {
                0.0
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let semaphore = AnalysisSemaphore::new(2);
        let a = semaphore.acquire(Duration::from_millis(50)).await.unwrap();
        let b = semaphore.acquire(Duration::from_millis(50)).await.unwrap();

        let snapshot = semaphore.snapshot();
        assert_eq!(snapshot.active, 2);
        assert_eq!(snapshot.available, 0);
        assert!(semaphore.would_block());

        drop(a);
        drop(b);
        let snapshot = semaphore.snapshot();
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.available, 2);
        assert!(!semaphore.would_block());
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_saturated() {
        let semaphore = AnalysisSemaphore::new(1);
        let _held = semaphore.acquire(Duration::from_millis(50)).await.unwrap();
        let second = semaphore.acquire(Duration::from_millis(50)).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_peak_and_utilization() {
        let semaphore = AnalysisSemaphore::new(4);
        let a = semaphore.acquire(Duration::from_millis(50)).await.unwrap();
        let b = semaphore.acquire(Duration::from_millis(50)).await.unwrap();
        let c = semaphore.acquire(Duration::from_millis(50)).await.unwrap();
        drop(b);
        drop(c);
        drop(a);

        let snapshot = semaphore.snapshot();
        assert_eq!(snapshot.peak, 3);
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.utilization, 0.0);
    }
}
