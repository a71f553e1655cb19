//! HTTP route handlers.

pub mod components;
pub mod health;
pub mod metrics;
pub mod services;

use std::sync::Arc;

use lifecycle::LifecycleManager;

/// Shared state of all runtime routes.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<LifecycleManager>,
}
