//! Prometheus exposition endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use crate::state::AppState;

/// GET /metrics/prometheus
///
/// Gauges reflect this instant; counter/histogram series advance on the
/// background refresh cadence.
pub async fn prometheus(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.observe_components(
        &state.limiter.snapshot(),
        &state.breaker.snapshot(),
        &state.semaphore.snapshot(),
    );

    let (body, content_type) = state.metrics.gather();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        body,
    )
}
