use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use newswire_analysis::{
    AdaptiveRateLimiter, AnalysisSemaphore, CircuitBreaker, Orchestrator, RunGovernor,
};
use newswire_core::Config;
use newswire_ingest::{AutoEnrolSender, FeedScheduler};

use crate::metrics::Metrics;

/// Shared application state handed to every handler.
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub scheduler: Arc<FeedScheduler>,
    pub governor: Arc<RunGovernor>,
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<AdaptiveRateLimiter>,
    pub breaker: Arc<CircuitBreaker>,
    pub semaphore: Arc<AnalysisSemaphore>,
    pub metrics: Arc<Metrics>,
    /// Intake into the auto-analysis pump (manual fetch endpoint uses it).
    pub intake: AutoEnrolSender,
    pub started_at: DateTime<Utc>,
}
