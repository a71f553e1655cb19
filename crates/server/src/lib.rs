//! Operations HTTP surface of the component runtime.
//!
//! Exposes the lifecycle state, the loaded components and services, health
//! checks of services and service providers, and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;
pub mod status;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/components", get(routes::components::list))
        .route("/services", get(routes::services::list))
        .route("/services/{name}/check", get(routes::services::check))
        .route(
            "/service-providers/{name}/check",
            get(routes::services::check_provider),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
