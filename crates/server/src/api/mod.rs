//! HTTP handlers. Every handler returns either JSON or a
//! `{"error": {"kind", "message"}}` body with the mapped status code.

pub mod analysis;
pub mod discovery;
pub mod doc;
pub mod feeds;
pub mod health;
pub mod items;
pub mod manager;
pub mod metrics;
pub mod scheduler;
pub mod templates;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use newswire_core::ErrorKind;
use newswire_store::StoreError;

/// Build the standard error response body.
pub(crate) fn error_response(
    kind: ErrorKind,
    message: impl Into<String>,
) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(json!({ "error": { "kind": kind.as_str(), "message": message.into() } })),
    )
}

/// Map a store error to an HTTP response.
pub(crate) fn store_err(e: StoreError) -> (StatusCode, Json<Value>) {
    error_response(e.kind(), e.to_string())
}

// ── Tests ────────────────────────────────────────────────────────────
