//! Extraction template CRUD and feed assignment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use newswire_core::ErrorKind;
use newswire_store::{CreateTemplate, FeedStore, TemplateStore, UpdateTemplate};

use crate::state::AppState;

use super::{error_response, store_err};

/// GET /templates
pub async fn templates_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let templates = TemplateStore::list(&state.pool).await.map_err(store_err)?;
    Ok(Json(serde_json::to_value(templates).unwrap_or_default()))
}

/// POST /templates
pub async fn templates_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTemplate>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let template = TemplateStore::create(&state.pool, req)
        .await
        .map_err(store_err)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::to_value(template).unwrap_or_default()),
    ))
}

/// GET /templates/{id}
pub async fn templates_get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let template = TemplateStore::get(&state.pool, id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| {
            error_response(ErrorKind::NotFound, format!("template not found: {}", id))
        })?;
    Ok(Json(serde_json::to_value(template).unwrap_or_default()))
}

/// PUT /templates/{id}
pub async fn templates_update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTemplate>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let template = TemplateStore::update(&state.pool, id, req)
        .await
        .map_err(store_err)?;
    Ok(Json(serde_json::to_value(template).unwrap_or_default()))
}

/// DELETE /templates/{id}
pub async fn templates_delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    TemplateStore::delete(&state.pool, id)
        .await
        .map_err(store_err)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AssignTemplateRequest {
    /// Null clears the assignment (back to URL matching).
    pub template_id: Option<Uuid>,
}

/// POST /feeds/{id}/template
pub async fn feeds_assign_template(
    State(state): State<Arc<AppState>>,
    Path(feed_id): Path<Uuid>,
    Json(req): Json<AssignTemplateRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Some(template_id) = req.template_id {
        TemplateStore::get(&state.pool, template_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| {
                error_response(
                    ErrorKind::ValidationError,
                    format!("template does not exist: {}", template_id),
                )
            })?;
    }

    let feed = FeedStore::set_template(&state.pool, feed_id, req.template_id)
        .await
        .map_err(store_err)?;

    Ok(Json(json!({
        "feed_id": feed.id,
        "template_id": feed.template_id,
    })))
}
