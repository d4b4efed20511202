//! Feed-scheduler controls: heartbeat, pause/resume, interval override.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use newswire_store::FeedStore;

use crate::state::AppState;

use super::store_err;

/// GET /scheduler/heartbeat
pub async fn heartbeat(State(state): State<Arc<AppState>>) -> Json<Value> {
    let snapshot = state.scheduler.heartbeat().await;
    Json(serde_json::to_value(snapshot).unwrap_or_default())
}

/// POST /scheduler/pause
pub async fn pause(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.pause();
    Json(json!({ "paused": true }))
}

/// POST /scheduler/resume
pub async fn resume(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.scheduler.resume();
    Json(json!({ "paused": false }))
}

#[derive(Debug, Deserialize)]
pub struct IntervalRequest {
    /// Specific feed, or all feeds when omitted.
    pub feed_id: Option<Uuid>,
    pub interval_minutes: i32,
}

/// POST /scheduler/interval
pub async fn set_interval(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IntervalRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let updated = FeedStore::set_interval(&state.pool, req.feed_id, req.interval_minutes)
        .await
        .map_err(store_err)?;
    Ok(Json(json!({
        "updated_feeds": updated,
        "interval_minutes": req.interval_minutes,
    })))
}
