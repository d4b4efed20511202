//! Analysis execution: backpressure primitives, run orchestration,
//! governance, and the auto-analysis pump.

pub mod auto;
pub mod breaker;
pub mod governor;
pub mod limiter;
pub mod orchestrator;
pub mod preview;
pub mod scope;
pub mod semaphore;
pub mod sweeper;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use governor::{GovernorStatus, RunDecision, RunGovernor, RunRequest};
pub use limiter::{AdaptiveRateLimiter, LimiterSnapshot};
pub use orchestrator::Orchestrator;
pub use preview::{compute_preview, Preview};
pub use semaphore::{AnalysisSemaphore, SemaphoreSnapshot};
