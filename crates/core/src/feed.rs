//! Feed rows and fetch telemetry types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Operational state of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum FeedStatus {
    Active,
    Paused,
    /// Reached the consecutive-failure threshold; still scheduled with backoff.
    Error,
}

/// Row from the `feeds` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    pub status: FeedStatus,
    /// Base fetch interval in minutes (5..1440).
    pub interval_minutes: i32,
    pub auto_analyze: bool,
    pub template_id: Option<Uuid>,
    pub next_fetch_at: Option<DateTime<Utc>>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Terminal classification of a single fetch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum FetchOutcome {
    Success,
    Error,
    /// Feed responded but yielded no parseable entries.
    Empty,
    Timeout,
}

/// Row from the append-only `fetch_log` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FetchLogEntry {
    pub id: i64,
    pub feed_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: FetchOutcome,
    pub items_found: i32,
    pub items_new: i32,
    pub error_message: Option<String>,
    pub response_time_ms: i64,
}

/// Row from the `feed_health` table (1:1 with feeds, derived).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeedHealth {
    pub feed_id: Uuid,
    pub success_rate_7d: f64,
    pub success_rate_30d: f64,
    pub avg_response_time_ms: f64,
    pub uptime_ratio: f64,
    pub consecutive_failures: i32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Per-feed analysis caps consulted by the run governor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct FeedLimits {
    pub feed_id: Uuid,
    pub max_daily_runs: Option<i32>,
    pub max_daily_cost: Option<f64>,
    pub max_monthly_cost: Option<f64>,
    pub alert_threshold: Option<f64>,
    pub auto_disable: bool,
    pub emergency_stopped: bool,
    pub updated_at: DateTime<Utc>,
}

// ── Tests ────────────────────────────────────────────────────────────
