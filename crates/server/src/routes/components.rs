//! Component listing endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use common::ComponentId;
use serde::Serialize;

use super::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentSummary {
    pub id: ComponentId,
    pub name: String,
    pub description: Option<String>,
    pub layer: &'static str,
    pub default_behavior: &'static str,
    pub resource_unit: Option<String>,
    pub interceptors: usize,
}

/// GET /components
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ComponentSummary>> {
    let components = state
        .manager
        .components()
        .iter()
        .map(|c| ComponentSummary {
            id: c.id(),
            name: c.name().to_string(),
            description: c.description().map(str::to_string),
            layer: c.layer().as_str(),
            default_behavior: c.default_behavior().as_str(),
            resource_unit: c.resource_unit().map(str::to_string),
            interceptors: c.interceptors().len(),
        })
        .collect();
    Json(components)
}
