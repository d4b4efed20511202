//! PostgreSQL repositories for the ingestion and analysis control plane.
//!
//! Every store is a stateless unit struct with async methods taking a
//! `&PgPool`. Relationships are referenced by id; no object graphs cross
//! crate boundaries.

pub mod analyses;
pub mod db;
pub mod error;
pub mod feeds;
pub mod fetch_log;
pub mod health;
pub mod items;
pub mod limits;
pub mod pending;
pub mod queued;
pub mod run_items;
pub mod runs;
pub mod templates;

pub use analyses::{AnalysisStore, ItemAnalysisRow};
pub use db::init_pg_pool;
pub use error::StoreError;
pub use feeds::{CreateFeed, FeedStore, UpdateFeed};
pub use fetch_log::{FetchLogStore, FetchRecord};
pub use health::FeedHealthStore;
pub use items::{ItemFilter, ItemStore, NewItem};
pub use limits::{FeedLimitStore, SetFeedLimits};
pub use pending::PendingAutoStore;
pub use queued::{QueuedRun, QueuedRunStore};
pub use run_items::RunItemStore;
pub use runs::{RunStore, StateCounts};
pub use templates::{CreateTemplate, TemplateStore, UpdateTemplate};
