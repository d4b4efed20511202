//! Governor controls: status, emergency halt, resume.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

use super::store_err;

/// GET /analysis/manager/status
pub async fn manager_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let governor = state.governor.status().await.map_err(store_err)?;
    Ok(Json(json!({
        "governor": governor,
        "limiter": state.limiter.snapshot(),
        "breaker": state.breaker.snapshot(),
        "semaphore": state.semaphore.snapshot(),
    })))
}

/// POST /analysis/manager/emergency-stop
pub async fn emergency_stop(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.governor.emergency_stop().await.map_err(store_err)?;
    Ok(Json(json!({ "halted": true })))
}

/// POST /analysis/manager/resume
pub async fn manager_resume(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    state.governor.resume().await.map_err(store_err)?;
    Ok(Json(json!({ "halted": false })))
}
