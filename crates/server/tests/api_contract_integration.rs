//! Integration tests for the HTTP JSON contract.
//!
//! Since `newswire-server` is a binary crate (no lib.rs), we test the
//! wire contract by defining mirror types and validating serialization
//! roundtrips against the documented shapes. Database-backed flows are
//! covered by the store/analysis crate tests.

use serde::{Deserialize, Serialize};

// ── Mirror types matching the public JSON contract ───────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorDetail {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Scope {
    Latest {
        count: u32,
    },
    Feeds {
        feed_ids: Vec<String>,
    },
    Items {
        item_ids: Vec<String>,
    },
    Timerange {
        start: String,
        end: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct StartRequest {
    scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<StartParams>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StartParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    override_existing: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[allow(dead_code)]
    id: String,
    status: String,
    #[serde(default)]
    queue_position: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct PreviewResponse {
    total_items: usize,
    already_analyzed: usize,
    to_analyze: usize,
    estimated_cost_usd: f64,
    estimated_duration_minutes: f64,
    sample_item_ids: Vec<String>,
    has_conflicts: bool,
}

// ── Error body shape ─────────────────────────────────────────────────

#[test]
fn error_body_roundtrip() {
    let json = r#"{"error":{"kind":"limit_exceeded","message":"daily run budget exhausted (5/day)"}}"#;
    let body: ErrorBody = serde_json::from_str(json).unwrap();
    assert_eq!(body.error.kind, "limit_exceeded");
    assert!(body.error.details.is_none());

    let out = serde_json::to_string(&body).unwrap();
    assert!(!out.contains("details"));
}

#[test]
fn error_kinds_are_stable_tokens() {
    // The documented kind vocabulary; automation clients match on these.
    for kind in [
        "validation_error",
        "limit_exceeded",
        "not_found",
        "conflict",
        "fetch_timeout",
        "llm_timeout",
        "llm_rate_limited",
        "db_unavailable",
        "fetch_http_error",
        "extraction_failure",
        "invalid_response",
        "provider_auth_error",
        "breaker_open",
        "system_halted",
        "queue_full",
        "internal_error",
    ] {
        assert!(kind.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
    }
}

// ── Scope union ──────────────────────────────────────────────────────

#[test]
fn scope_latest_wire_format() {
    let scope = Scope::Latest { count: 25 };
    let json = serde_json::to_string(&scope).unwrap();
    assert_eq!(json, r#"{"type":"latest","count":25}"#);
}

#[test]
fn scope_timerange_wire_format() {
    let json = r#"{"type":"timerange","start":"2026-07-01T00:00:00Z","end":"2026-07-02T00:00:00Z"}"#;
    let scope: Scope = serde_json::from_str(json).unwrap();
    assert!(matches!(scope, Scope::Timerange { .. }));
}

#[test]
fn scope_rejects_unknown_tag() {
    let result: Result<Scope, _> =
        serde_json::from_str(r#"{"type":"everything"}"#);
    assert!(result.is_err());
}

// ── Start request/response ───────────────────────────────────────────

#[test]
fn start_request_minimal() {
    let request = StartRequest {
        scope: Scope::Latest { count: 5 },
        params: None,
    };
    let json = serde_json::to_string(&request).unwrap();
    assert!(!json.contains("params"));

    let parsed: StartRequest = serde_json::from_str(&json).unwrap();
    assert!(matches!(parsed.scope, Scope::Latest { count: 5 }));
}

#[test]
fn start_response_running() {
    let json = r#"{"id":"00000000-0000-0000-0000-000000000001","status":"running"}"#;
    let response: StartResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.status, "running");
    assert!(response.queue_position.is_none());
}

#[test]
fn start_response_queued_carries_position() {
    let json = r#"{"id":"00000000-0000-0000-0000-000000000001","status":"queued","queue_position":3}"#;
    let response: StartResponse = serde_json::from_str(json).unwrap();
    assert_eq!(response.status, "queued");
    assert_eq!(response.queue_position, Some(3));
}

// ── Preview ──────────────────────────────────────────────────────────

#[test]
fn preview_response_shape() {
    let json = r#"{
        "total_items": 5,
        "already_analyzed": 2,
        "to_analyze": 3,
        "estimated_cost_usd": 0.0015,
        "estimated_duration_minutes": 0.025,
        "sample_item_ids": ["00000000-0000-0000-0000-000000000001"],
        "has_conflicts": false
    }"#;
    let preview: PreviewResponse = serde_json::from_str(json).unwrap();
    assert_eq!(preview.total_items, 5);
    assert_eq!(
        preview.total_items - preview.already_analyzed,
        preview.to_analyze
    );
    assert!(preview.estimated_cost_usd > 0.0);
    assert!(preview.estimated_duration_minutes > 0.0);
    assert_eq!(preview.sample_item_ids.len(), 1);
    assert!(!preview.has_conflicts);
}

// ── Analysis payload contract ────────────────────────────────────────

#[test]
fn analysis_payload_geopolitical_optional() {
    // The discovery guide promises geopolitical is omitted, never null.
    let without: serde_json::Value = serde_json::from_str(
        r#"{
            "sentiment": {
                "overall": {"label": "neutral", "score": 0.0, "confidence": 0.5},
                "market": {"bullish": 0.2, "bearish": 0.2, "uncertainty": 0.6,
                           "time_horizon": "medium"},
                "urgency": 0.1,
                "themes": []
            },
            "impact": {"overall": 0.3, "volatility": 0.2},
            "model_tag": "claude-haiku-4-5"
        }"#,
    )
    .unwrap();
    assert!(without.get("geopolitical").is_none());
    assert_eq!(without["sentiment"]["overall"]["label"], "neutral");
}

#[test]
fn money_serializes_as_plain_number() {
    let value = serde_json::json!({"estimated_cost_usd": 0.002511});
    let text = serde_json::to_string(&value).unwrap();
    assert_eq!(text, r#"{"estimated_cost_usd":0.002511}"#);
}
