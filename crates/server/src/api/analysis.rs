//! Analysis control: preview, start, run inspection, cancellation.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use newswire_analysis::{RunDecision, RunRequest};
use newswire_core::{ErrorKind, RunItemState};
use newswire_store::{RunItemStore, RunStore};

use crate::state::AppState;

use super::{error_response, store_err};

/// POST /analysis/preview
#[utoipa::path(post, path = "/analysis/preview", request_body = RunRequest, responses(
    (status = 200, description = "Deterministic scope preview", body = newswire_analysis::Preview)
))]
pub async fn analysis_preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let preview = state
        .governor
        .preview(&request)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(preview).unwrap_or_default()))
}

/// POST /analysis/start
#[utoipa::path(post, path = "/analysis/start", request_body = RunRequest, responses(
    (status = 200, description = "Run accepted (running or queued)"),
    (status = 400, description = "Budget exhausted or system halted")
))]
pub async fn analysis_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.governor.request_run(request).await.map_err(store_err)? {
        RunDecision::Started { run_id } => Ok(Json(json!({
            "id": run_id,
            "status": "running",
        }))),
        RunDecision::Queued { run_id, position } => Ok(Json(json!({
            "id": run_id,
            "status": "queued",
            "queue_position": position,
        }))),
        RunDecision::Rejected { kind, message } => Err(error_response(kind, message)),
    }
}

#[derive(Debug, Deserialize)]
pub struct RunListQuery {
    #[serde(default)]
    pub active_only: bool,
    pub limit: Option<i64>,
}

/// GET /analysis/runs
pub async fn runs_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RunListQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let runs = RunStore::list(
        &state.pool,
        query.active_only,
        query.limit.unwrap_or(50).clamp(1, 500),
    )
    .await
    .map_err(store_err)?;
    Ok(Json(serde_json::to_value(runs).unwrap_or_default()))
}

/// GET /analysis/runs/{id}
#[utoipa::path(get, path = "/analysis/runs/{id}", responses(
    (status = 200, description = "Run snapshot", body = newswire_core::AnalysisRun),
    (status = 404, description = "Unknown run")
))]
pub async fn runs_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let run = RunStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| error_response(ErrorKind::NotFound, format!("run not found: {}", id)))?;
    Ok(Json(serde_json::to_value(run).unwrap_or_default()))
}

#[derive(Debug, Deserialize)]
pub struct RunItemsQuery {
    pub state: Option<RunItemState>,
}

/// GET /analysis/runs/{id}/items
pub async fn runs_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RunItemsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    RunStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| error_response(ErrorKind::NotFound, format!("run not found: {}", id)))?;

    let items = RunItemStore::list(&state.pool, id, query.state)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(items).unwrap_or_default()))
}

/// POST /analysis/runs/{id}/cancel
pub async fn runs_cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.governor.cancel(id).await.map_err(store_err)?;
    Ok(Json(json!({ "id": id, "cancellation": "accepted" })))
}
