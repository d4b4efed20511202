//! Liveness and corpus statistics.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use newswire_store::{AnalysisStore, FeedStore, FetchLogStore, ItemStore, PendingAutoStore};

use crate::state::AppState;

use super::store_err;

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at,
    }))
}

/// GET /stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let feeds = FeedStore::count(&state.pool).await.map_err(store_err)?;
    let items = ItemStore::count(&state.pool).await.map_err(store_err)?;
    let analyses = AnalysisStore::count(&state.pool).await.map_err(store_err)?;
    let pending_auto = PendingAutoStore::open_count(&state.pool)
        .await
        .map_err(store_err)?;
    let fetches_24h = FetchLogStore::success_count_since(
        &state.pool,
        chrono::Utc::now() - chrono::Duration::hours(24),
    )
    .await
    .map_err(store_err)?;

    let analyzed_ratio = if items > 0 {
        analyses as f64 / items as f64
    } else {
        0.0
    };

    Ok(Json(json!({
        "feeds": feeds,
        "items": items,
        "analyses": analyses,
        "analyzed_ratio": analyzed_ratio,
        "pending_auto_batches": pending_auto,
        "successful_fetches_24h": fetches_24h,
        "config": state.config.redacted_summary(),
    })))
}
