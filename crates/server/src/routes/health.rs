//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use lifecycle::LifecycleState;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub lifecycle: LifecycleState,
    pub application: String,
    pub version: String,
}

/// GET /health: reports the lifecycle state of the runtime. Answers 503
/// unless the runtime is initialized.
pub async fn check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let lifecycle = state.manager.lifecycle_state();
    let (code, status) = match lifecycle {
        LifecycleState::Initialized => (StatusCode::OK, "ok"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unavailable"),
    };
    let settings = state.manager.settings();
    (
        code,
        Json(HealthResponse {
            status,
            lifecycle,
            application: settings.application_name.clone(),
            version: settings.application_version.clone(),
        }),
    )
}
