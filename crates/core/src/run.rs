//! Analysis run types: scope, parameters, run rows, per-item state, and
//! auto-analysis batch tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// ── Scope (tagged union) ─────────────────────────────────────────────

/// Selector of the items a run operates on.
///
/// Stored as JSONB in `analysis_runs.scope`, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunScope {
    /// The n most recently published items.
    Latest { count: u32 },
    /// All items belonging to the given feeds.
    Feeds { feed_ids: Vec<Uuid> },
    /// An explicit item list.
    Items { item_ids: Vec<Uuid> },
    /// Items published inside [start, end].
    Timerange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl RunScope {
    /// The single feed this scope touches, if any (per-feed caps apply then).
    pub fn single_feed(&self) -> Option<Uuid> {
        match self {
            Self::Feeds { feed_ids } if feed_ids.len() == 1 => Some(feed_ids[0]),
            _ => None,
        }
    }

    /// Whether the scope trivially selects nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Latest { count } => *count == 0,
            Self::Feeds { feed_ids } => feed_ids.is_empty(),
            Self::Items { item_ids } => item_ids.is_empty(),
            Self::Timerange { start, end } => start >= end,
        }
    }
}

/// Tunable parameters for a run.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RunParams {
    /// Classifier model tag; empty string means "use the configured default".
    #[serde(default)]
    pub model_tag: String,
    /// Optional per-run rate cap (tokens/sec) below the limiter's configured rate.
    #[serde(default)]
    pub rate_per_second: Option<f64>,
    /// Cap on items per run; ignored for timerange scopes.
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Re-analyze items that already have a stored analysis.
    #[serde(default)]
    pub override_existing: bool,
}

fn default_limit() -> u32 {
    200
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            model_tag: String::new(),
            rate_per_second: None,
            limit: default_limit(),
            override_existing: false,
        }
    }
}

// ── Run rows ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// How a run came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Auto,
    Api,
}

/// Row from the `analysis_runs` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AnalysisRun {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub scope: serde_json::Value,
    #[schema(value_type = Object)]
    pub params: serde_json::Value,
    pub status: RunStatus,
    pub trigger_source: TriggerSource,
    pub model_tag: String,
    pub total_items: i32,
    pub queued_count: i32,
    pub processed_count: i32,
    pub failed_count: i32,
    pub skipped_count: i32,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub cancel_requested: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisRun {
    pub fn scope(&self) -> Result<RunScope, serde_json::Error> {
        serde_json::from_value(self.scope.clone())
    }

    pub fn params(&self) -> Result<RunParams, serde_json::Error> {
        serde_json::from_value(self.params.clone())
    }
}

// ── Run items ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum RunItemState {
    Queued,
    Processing,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl RunItemState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::Processing)
    }
}

/// Row from the `run_items` table. `(run_id, item_id)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct RunItem {
    pub id: Uuid,
    pub run_id: Uuid,
    pub item_id: Uuid,
    pub state: RunItemState,
    pub position: i32,
    pub error: Option<String>,
    pub tokens_used: i64,
    pub cost: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ── Auto-analysis batches ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Row from `pending_auto_analysis`: one batch of newly ingested items
/// from an auto-enabled feed awaiting (or undergoing) analysis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PendingAutoAnalysis {
    pub id: Uuid,
    pub feed_id: Uuid,
    #[schema(value_type = Vec<String>)]
    pub item_ids: serde_json::Value,
    pub status: PendingStatus,
    pub run_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl PendingAutoAnalysis {
    pub fn item_ids(&self) -> Vec<Uuid> {
        serde_json::from_value(self.item_ids.clone()).unwrap_or_default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_latest_roundtrip() {
        let scope = RunScope::Latest { count: 25 };
        let json = serde_json::to_string(&scope).unwrap();
        assert_eq!(json, r#"{"type":"latest","count":25}"#);
        let parsed: RunScope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, scope);
    }

    #[test]
    fn test_scope_timerange_roundtrip() {
        let json = r#"{"type":"timerange","start":"2026-07-01T00:00:00Z","end":"2026-07-02T00:00:00Z"}"#;
        let scope: RunScope = serde_json::from_str(json).unwrap();
        match &scope {
            RunScope::Timerange { start, end } => assert!(start < end),
            other => panic!("expected Timerange, got {:?}", other),
        }
        let json2 = serde_json::to_string(&scope).unwrap();
        let _: RunScope = serde_json::from_str(&json2).unwrap();
    }

    #[test]
    fn test_scope_single_feed() {
        let one = RunScope::Feeds {
            feed_ids: vec![Uuid::new_v4()],
        };
        assert!(one.single_feed().is_some());

        let two = RunScope::Feeds {
            feed_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
        };
        assert!(two.single_feed().is_none());

        assert!(RunScope::Latest { count: 5 }.single_feed().is_none());
    }

    #[test]
    fn test_scope_is_empty() {
        assert!(RunScope::Latest { count: 0 }.is_empty());
        assert!(!RunScope::Latest { count: 1 }.is_empty());
        assert!(RunScope::Items { item_ids: vec![] }.is_empty());

        let now = Utc::now();
        assert!(RunScope::Timerange {
            start: now,
            end: now
        }
        .is_empty());
    }

    #[test]
    fn test_params_defaults() {
        let params: RunParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.model_tag, "");
        assert_eq!(params.limit, 200);
        assert!(!params.override_existing);
        assert!(params.rate_per_second.is_none());
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
    }

    #[test]
    fn test_run_item_state_terminal() {
        assert!(RunItemState::Skipped.is_terminal());
        assert!(RunItemState::Cancelled.is_terminal());
        assert!(!RunItemState::Queued.is_terminal());
        assert!(!RunItemState::Processing.is_terminal());
    }

    #[test]
    fn test_trigger_source_serde() {
        let json = serde_json::to_string(&TriggerSource::Auto).unwrap();
        assert_eq!(json, r#""auto""#);
    }

    #[test]
    fn test_pending_item_ids_parse() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let row = PendingAutoAnalysis {
            id: Uuid::new_v4(),
            feed_id: Uuid::new_v4(),
            item_ids: serde_json::to_value(&ids).unwrap(),
            status: PendingStatus::Pending,
            run_id: None,
            created_at: Utc::now(),
            processed_at: None,
        };
        assert_eq!(row.item_ids(), ids);
    }
}
