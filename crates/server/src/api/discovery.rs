//! Discovery surface for automation clients: schemas, live examples, a
//! usage guide, and a feature catalog. Everything here is read-only.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use utoipa::OpenApi;

use newswire_core::ErrorKind;
use newswire_store::{AnalysisStore, ItemStore, RunStore};

use crate::state::AppState;

use super::doc::ApiDoc;
use super::{error_response, store_err};

/// Discovery name → OpenAPI component schema.
const SCHEMA_NAMES: &[(&str, &str)] = &[
    ("item", "Item"),
    ("item-with-analysis", "ItemAnalysisPayload"),
    ("sentiment", "SentimentPayload"),
    ("impact", "ImpactPayload"),
    ("geopolitical", "GeopoliticalPayload"),
    ("analysis-run", "AnalysisRun"),
    ("run-item", "RunItem"),
    ("feed", "Feed"),
    ("template", "FeedTemplate"),
];

fn component_schema(component: &str) -> Option<Value> {
    let openapi = ApiDoc::openapi();
    let components = openapi.components.as_ref()?;
    let schema = components.schemas.get(component)?;
    serde_json::to_value(schema).ok()
}

/// GET /discovery/schemas
pub async fn schemas_index() -> Json<Value> {
    let names: Vec<&str> = SCHEMA_NAMES.iter().map(|(name, _)| *name).collect();
    Json(json!({ "schemas": names }))
}

/// GET /discovery/schemas/{name}
pub async fn schema_by_name(
    Path(name): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let component = SCHEMA_NAMES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, component)| *component)
        .ok_or_else(|| {
            error_response(ErrorKind::NotFound, format!("unknown schema: {}", name))
        })?;

    let schema = component_schema(component).ok_or_else(|| {
        error_response(
            ErrorKind::InternalError,
            format!("schema not present in OpenAPI components: {}", component),
        )
    })?;

    Ok(Json(json!({ "name": name, "schema": schema })))
}

/// GET /discovery/examples/{type}
///
/// Returns one real row when the corpus has one, else a canned example so
/// clients can integrate against an empty deployment.
pub async fn example(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let example = match kind.as_str() {
        "item" => {
            let items = ItemStore::list(&state.pool, &Default::default())
                .await
                .map_err(store_err)?;
            items
                .into_iter()
                .next()
                .map(|item| serde_json::to_value(item).unwrap_or_default())
                .unwrap_or_else(canned_item)
        }
        "analysis" | "item-with-analysis" => {
            let row = AnalysisStore::example(&state.pool).await.map_err(store_err)?;
            match row.and_then(|row| row.payload().ok()) {
                Some(payload) => serde_json::to_value(payload).unwrap_or_default(),
                None => canned_analysis(),
            }
        }
        "analysis-run" => {
            let runs = RunStore::list(&state.pool, false, 1).await.map_err(store_err)?;
            runs.into_iter()
                .next()
                .map(|run| serde_json::to_value(run).unwrap_or_default())
                .unwrap_or_else(canned_run)
        }
        other => {
            return Err(error_response(
                ErrorKind::NotFound,
                format!("no example for type: {}", other),
            ))
        }
    };

    Ok(Json(json!({ "type": kind, "example": example })))
}

/// GET /discovery/usage-guide
pub async fn usage_guide() -> Json<Value> {
    Json(json!({
        "title": "Newswire automation guide",
        "content": USAGE_GUIDE,
    }))
}

/// GET /discovery/features
pub async fn features() -> Json<Value> {
    Json(json!({
        "features": [
            {
                "name": "feeds",
                "description": "RSS/Atom sources with adaptive fetch scheduling and health tracking",
                "endpoints": ["/feeds", "/feeds/{id}", "/feeds/{id}/fetch", "/feeds/{id}/health", "/feeds/{id}/fetch-log", "/feeds/{id}/limits"]
            },
            {
                "name": "templates",
                "description": "Per-feed extraction templates: match rules, CSS/attribute selectors, processing rules",
                "endpoints": ["/templates", "/templates/{id}", "/feeds/{id}/template"]
            },
            {
                "name": "items",
                "description": "Deduplicated articles with sentiment/impact/geopolitical filters",
                "endpoints": ["/items", "/items/{id}", "/items/{id}/analysis"]
            },
            {
                "name": "analysis",
                "description": "Cost-previewed, governed LLM classification runs",
                "endpoints": ["/analysis/preview", "/analysis/start", "/analysis/runs", "/analysis/runs/{id}", "/analysis/runs/{id}/items", "/analysis/runs/{id}/cancel"]
            },
            {
                "name": "manager",
                "description": "Run governor status plus emergency halt and resume",
                "endpoints": ["/analysis/manager/status", "/analysis/manager/emergency-stop", "/analysis/manager/resume"]
            },
            {
                "name": "scheduler",
                "description": "Feed scheduler heartbeat and controls",
                "endpoints": ["/scheduler/heartbeat", "/scheduler/pause", "/scheduler/resume", "/scheduler/interval"]
            },
            {
                "name": "observability",
                "description": "Prometheus exposition and corpus statistics",
                "endpoints": ["/metrics/prometheus", "/stats", "/health"]
            },
            {
                "name": "discovery",
                "description": "This surface: schemas, examples, usage guide",
                "endpoints": ["/discovery/schemas", "/discovery/schemas/{name}", "/discovery/examples/{type}", "/discovery/usage-guide", "/discovery/features"]
            }
        ]
    }))
}

fn canned_item() -> Value {
    json!({
        "id": "00000000-0000-0000-0000-000000000001",
        "feed_id": "00000000-0000-0000-0000-000000000002",
        "title": "Central bank holds rates steady",
        "link": "https://example.com/articles/rates-hold",
        "content": "The central bank left its policy rate unchanged, citing cooling inflation.",
        "author": "Newsdesk",
        "published_at": "2026-07-14T09:30:00Z",
        "ingested_at": "2026-07-14T09:35:12Z",
        "content_hash": "2c26b46b68ffc68ff99b453c1d30413413422d706483bfa0f98a5e886266e7ae"
    })
}

fn canned_analysis() -> Value {
    json!({
        "sentiment": {
            "overall": {"label": "neutral", "score": 0.05, "confidence": 0.82},
            "market": {"bullish": 0.35, "bearish": 0.25, "uncertainty": 0.3,
                       "time_horizon": "medium"},
            "urgency": 0.2,
            "themes": ["monetary_policy", "inflation"]
        },
        "impact": {"overall": 0.45, "volatility": 0.3},
        "model_tag": "claude-haiku-4-5"
    })
}

fn canned_run() -> Value {
    json!({
        "id": "00000000-0000-0000-0000-000000000003",
        "scope": {"type": "latest", "count": 50},
        "params": {"model_tag": "claude-haiku-4-5", "limit": 200, "override_existing": false},
        "status": "completed",
        "trigger_source": "manual",
        "model_tag": "claude-haiku-4-5",
        "total_items": 50,
        "queued_count": 0,
        "processed_count": 48,
        "failed_count": 0,
        "skipped_count": 2,
        "estimated_cost": 0.025,
        "actual_cost": 0.0231,
        "created_at": "2026-07-14T10:00:00Z",
        "started_at": "2026-07-14T10:00:01Z",
        "completed_at": "2026-07-14T10:04:37Z"
    })
}

const USAGE_GUIDE: &str = r#"# Newswire automation guide

## Workflow

1. Register feeds with `POST /feeds` (set `auto_analyze` for hands-off
   classification of new items).
2. The scheduler fetches each feed on its adaptive interval; check
   `/scheduler/heartbeat` and `/feeds/{id}/health` for liveness.
3. Preview an analysis with `POST /analysis/preview` — the same scope and
   params always return the same counts and cost estimate.
4. Start it with `POST /analysis/start`. The response status is `running`,
   `queued` (with `queue_position`), or an error body when a budget is
   exhausted (`limit_exceeded`) or the system is halted (`system_halted`).
5. Poll `GET /analysis/runs/{id}` for counters and cost; fetch results via
   `GET /items/{id}/analysis` or filtered `GET /items`.

## Scopes

- `{"type": "latest", "count": n}` — n most recent items.
- `{"type": "feeds", "feed_ids": [...]}` — everything in those feeds.
- `{"type": "items", "item_ids": [...]}` — explicit list.
- `{"type": "timerange", "start": ..., "end": ...}` — published window;
  ignores `params.limit`.

## Score ranges

- `sentiment.overall.score`: -1 (very negative) .. 1 (very positive).
- `sentiment.overall.confidence`, `market.*`, `urgency`: 0 .. 1.
- `impact.overall`, `impact.volatility`: 0 .. 1.
- `geopolitical` is OPTIONAL: absent for articles with no geopolitical
  content. Check for key existence before reading it.
- `geopolitical.stability_score`, `economic_impact`, `diplomatic_impact.*`:
  -1 .. 1; all other geopolitical scores: 0 .. 1.

## Conventions

- Timestamps are ISO-8601 UTC with a trailing `Z`.
- Money is USD with up to 6 decimals.
- Errors are `{"error": {"kind": ..., "message": ...}}`; `kind` is a
  stable machine-readable token.
"#;

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_discovery_schema_resolves() {
        for (alias, component) in SCHEMA_NAMES {
            assert!(
                component_schema(component).is_some(),
                "schema {} ({}) missing from OpenAPI components",
                alias,
                component
            );
        }
    }

    #[test]
    fn test_canned_examples_are_valid_payloads() {
        let analysis = canned_analysis();
        let parsed: Result<newswire_core::ItemAnalysisPayload, _> =
            serde_json::from_value(analysis);
        assert!(parsed.is_ok());
        assert!(parsed.unwrap().geopolitical.is_none());
    }

    #[test]
    fn test_usage_guide_mentions_error_shape() {
        assert!(USAGE_GUIDE.contains("limit_exceeded"));
        assert!(USAGE_GUIDE.contains("system_halted"));
        assert!(USAGE_GUIDE.contains("geopolitical"));
    }
}
