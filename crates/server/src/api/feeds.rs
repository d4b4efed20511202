//! Feed CRUD, manual fetch, health, fetch log, and per-feed limits.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use newswire_core::ErrorKind;
use newswire_ingest::{ingest_payload, Fetcher};
use newswire_store::{
    CreateFeed, FeedHealthStore, FeedLimitStore, FeedStore, FetchLogStore, SetFeedLimits,
    UpdateFeed,
};

use crate::state::AppState;

use super::{error_response, store_err};

/// GET /feeds
#[utoipa::path(get, path = "/feeds", responses(
    (status = 200, description = "All feeds", body = [newswire_core::Feed])
))]
pub async fn feeds_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let feeds = FeedStore::list(&state.pool).await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(feeds).unwrap_or_default()))
}

/// POST /feeds
#[utoipa::path(post, path = "/feeds", request_body = CreateFeed, responses(
    (status = 201, description = "Feed created", body = newswire_core::Feed)
))]
pub async fn feeds_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFeed>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let feed = FeedStore::create(&state.pool, req).await.map_err(store_err)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(feed).unwrap_or_default()),
    ))
}

/// GET /feeds/{id}
pub async fn feeds_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let feed = FeedStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| error_response(ErrorKind::NotFound, format!("feed not found: {}", id)))?;
    Ok(Json(serde_json::to_value(feed).unwrap_or_default()))
}

/// PUT /feeds/{id}
pub async fn feeds_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFeed>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let feed = FeedStore::update(&state.pool, id, req)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(feed).unwrap_or_default()))
}

/// DELETE /feeds/{id}
pub async fn feeds_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    FeedStore::delete(&state.pool, id).await.map_err(store_err)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /feeds/{id}/fetch — fetch and ingest immediately, bypassing the
/// schedule. The scheduler's bookkeeping is not touched; this is an
/// operator probe.
pub async fn feeds_fetch_now(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let feed = FeedStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| error_response(ErrorKind::NotFound, format!("feed not found: {}", id)))?;

    let fetcher = Fetcher::new(&state.config.fetch).map_err(|e| {
        error_response(ErrorKind::InternalError, format!("fetcher init failed: {}", e))
    })?;

    let payload = match fetcher.fetch(&feed.url).await {
        Ok(payload) => payload,
        Err(e) => {
            return Ok(Json(json!({
                "fetched": false,
                "error": e.to_string(),
            })))
        }
    };

    let outcome = ingest_payload(&state.pool, &feed, &payload, Some(&state.intake))
        .await
        .map_err(|e| error_response(ErrorKind::InternalError, e.to_string()))?;

    Ok(Json(json!({
        "fetched": true,
        "items_found": outcome.items_found,
        "items_new": outcome.items_new,
        "rejected": outcome.failures,
    })))
}

/// GET /feeds/{id}/health
pub async fn feeds_health(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let health = FeedHealthStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            error_response(ErrorKind::NotFound, format!("no health recorded for feed {}", id))
        })?;
    Ok(Json(serde_json::to_value(health).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct FetchLogQuery {
    pub limit: Option<i64>,
}

/// GET /feeds/{id}/fetch-log
pub async fn feeds_fetch_log(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<FetchLogQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let entries = FetchLogStore::recent(&state.pool, id, query.limit.unwrap_or(50).clamp(1, 500))
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(entries).unwrap_or_default()))
}

/// GET /feeds/{id}/limits
pub async fn feeds_limits_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limits = FeedLimitStore::get(&state.pool, id).await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(limits).unwrap_or_default()))
}

/// PUT /feeds/{id}/limits
pub async fn feeds_limits_set(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetFeedLimits>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limits = FeedLimitStore::set(&state.pool, id, req)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(limits).unwrap_or_default()))
}
