//! Feed fetching, extraction, dedup, and scheduling.

pub mod canonical;
pub mod fetcher;
pub mod pipeline;
pub mod scheduler;
pub mod template;

pub use fetcher::{FetchError, FetchedPayload, Fetcher};
pub use pipeline::{ingest_payload, AutoEnrolSender, IngestOutcome};
pub use scheduler::{FeedScheduler, HeartbeatSnapshot};
