//! Item listing and per-item analysis access.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use newswire_core::ErrorKind;
use newswire_store::{AnalysisStore, ItemFilter, ItemStore};

use crate::state::AppState;

use super::{error_response, store_err};

/// GET /items
#[utoipa::path(get, path = "/items", params(ItemFilter), responses(
    (status = 200, description = "Filtered items", body = [newswire_core::Item])
))]
pub async fn items_list(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ItemFilter>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let items = ItemStore::list(&state.pool, &filter).await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(items).unwrap_or_default()))
}

/// GET /items/{id}
pub async fn items_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let item = ItemStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| error_response(ErrorKind::NotFound, format!("item not found: {}", id)))?;
    Ok(Json(serde_json::to_value(item).unwrap_or_default()))
}

/// GET /items/{id}/analysis
pub async fn items_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let row = AnalysisStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            error_response(ErrorKind::NotFound, format!("no analysis for item {}", id))
        })?;

    // Typed accessor: stored JSON is re-validated on the way out.
    let payload = row.payload().map_err(|e| {
        error_response(
            ErrorKind::InternalError,
            format!("stored analysis is malformed: {}", e),
        )
    })?;

    Ok(Json(json!({
        "item_id": row.item_id,
        "analysis": payload,
        "updated_at": row.updated_at,
    })))
}
