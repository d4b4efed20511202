//! HTTP router construction.
//!
//! Assembles all Axum routes, middleware, and OpenAPI docs into a single
//! `Router`.

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::api;
use crate::state::AppState;

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health::health))
        .route("/stats", get(api::health::stats))
        // Feeds
        .route("/feeds", get(api::feeds::feeds_list).post(api::feeds::feeds_create))
        .route(
            "/feeds/{id}",
            get(api::feeds::feeds_get)
                .put(api::feeds::feeds_update)
                .delete(api::feeds::feeds_delete),
        )
        .route("/feeds/{id}/fetch", post(api::feeds::feeds_fetch_now))
        .route("/feeds/{id}/health", get(api::feeds::feeds_health))
        .route("/feeds/{id}/fetch-log", get(api::feeds::feeds_fetch_log))
        .route(
            "/feeds/{id}/limits",
            get(api::feeds::feeds_limits_get).put(api::feeds::feeds_limits_set),
        )
        .route("/feeds/{id}/template", post(api::templates::feeds_assign_template))
        // Templates
        .route(
            "/templates",
            get(api::templates::templates_list).post(api::templates::templates_create),
        )
        .route(
            "/templates/{id}",
            get(api::templates::templates_get)
                .put(api::templates::templates_update)
                .delete(api::templates::templates_delete),
        )
        // Items
        .route("/items", get(api::items::items_list))
        .route("/items/{id}", get(api::items::items_get))
        .route("/items/{id}/analysis", get(api::items::items_analysis))
        // Analysis
        .route("/analysis/preview", post(api::analysis::analysis_preview))
        .route("/analysis/start", post(api::analysis::analysis_start))
        .route("/analysis/runs", get(api::analysis::runs_list))
        .route("/analysis/runs/{id}", get(api::analysis::runs_get))
        .route("/analysis/runs/{id}/items", get(api::analysis::runs_items))
        .route("/analysis/runs/{id}/cancel", post(api::analysis::runs_cancel))
        // Manager
        .route("/analysis/manager/status", get(api::manager::manager_status))
        .route(
            "/analysis/manager/emergency-stop",
            post(api::manager::emergency_stop),
        )
        .route("/analysis/manager/resume", post(api::manager::manager_resume))
        // Scheduler
        .route("/scheduler/heartbeat", get(api::scheduler::heartbeat))
        .route("/scheduler/pause", post(api::scheduler::pause))
        .route("/scheduler/resume", post(api::scheduler::resume))
        .route("/scheduler/interval", put(api::scheduler::set_interval).post(api::scheduler::set_interval))
        // Metrics
        .route("/metrics/prometheus", get(api::metrics::prometheus))
        // Discovery
        .route("/discovery/schemas", get(api::discovery::schemas_index))
        .route("/discovery/schemas/{name}", get(api::discovery::schema_by_name))
        .route("/discovery/examples/{type}", get(api::discovery::example))
        .route("/discovery/usage-guide", get(api::discovery::usage_guide))
        .route("/discovery/features", get(api::discovery::features))
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(Scalar::with_url("/docs", api::doc::ApiDoc::openapi()))
}
