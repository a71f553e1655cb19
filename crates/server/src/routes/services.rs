//! Service listing and health check endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use channel::{CheckLevel, HealthCheckResult};
use common::InterfaceId;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub interface: String,
    pub component: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub name: String,
    pub level: CheckLevel,
    /// `None` when the target does not implement a check.
    pub result: Option<HealthCheckResult>,
}

/// GET /services
pub async fn list(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceSummary>> {
    let mut services: Vec<ServiceSummary> = state
        .manager
        .services()
        .iter()
        .map(|entry| ServiceSummary {
            name: entry.interface().short_name().to_string(),
            interface: entry.interface().name().to_string(),
            component: entry.component().name().to_string(),
        })
        .collect();
    services.sort_by(|a, b| a.name.cmp(&b.name));
    Json(services)
}

/// GET /services/{name}/check?level=internal|external
///
/// Runs the check through the dispatcher in its own transaction.
pub async fn check(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    let level = parse_level(query.level.as_deref())?;
    ensure_running(&state)?;
    let interface = find(
        state.manager.services().iter().map(|e| e.interface()),
        &name,
    )
    .ok_or_else(|| ApiError::NotFound(format!("Service {name} not found")))?;

    metrics::counter!("health_checks_total", "target" => "service").increment(1);
    let result = state.manager.check_service(interface, level).await?;
    tracing::debug!(service = %name, level = %level, "service checked");
    Ok(Json(CheckResponse {
        name,
        level,
        result,
    }))
}

/// GET /service-providers/{name}/check?level=internal|external
pub async fn check_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<CheckResponse>, ApiError> {
    let level = parse_level(query.level.as_deref())?;
    ensure_running(&state)?;
    let interface = find(state.manager.service_providers().into_iter(), &name)
        .ok_or_else(|| ApiError::NotFound(format!("Service provider {name} not found")))?;

    metrics::counter!("health_checks_total", "target" => "service_provider").increment(1);
    let result = state
        .manager
        .check_service_provider(interface, level)
        .await?;
    Ok(Json(CheckResponse {
        name,
        level,
        result,
    }))
}

fn parse_level(level: Option<&str>) -> Result<CheckLevel, ApiError> {
    match level {
        None => Ok(CheckLevel::default()),
        Some(level) => level.parse().map_err(ApiError::BadRequest),
    }
}

fn ensure_running(state: &AppState) -> Result<(), ApiError> {
    if state.manager.is_initialized() {
        Ok(())
    } else {
        Err(ApiError::Unavailable(format!(
            "Runtime is {}",
            state.manager.lifecycle_state()
        )))
    }
}

/// Matches either the short or the fully qualified interface name.
fn find(mut interfaces: impl Iterator<Item = InterfaceId>, name: &str) -> Option<InterfaceId> {
    interfaces.find(|i| i.short_name() == name || i.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Ledger {}
    trait Audit {}

    #[test]
    fn test_parse_level_defaults_to_internal() {
        assert_eq!(parse_level(None).unwrap(), CheckLevel::Internal);
        assert_eq!(parse_level(Some("EXTERNAL")).unwrap(), CheckLevel::External);
        assert!(matches!(
            parse_level(Some("deep")),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_find_matches_short_and_full_names() {
        let ids = [InterfaceId::of::<dyn Ledger>(), InterfaceId::of::<dyn Audit>()];
        assert_eq!(
            find(ids.into_iter(), "Audit"),
            Some(InterfaceId::of::<dyn Audit>())
        );
        let full = InterfaceId::of::<dyn Ledger>().name().to_string();
        assert_eq!(
            find(ids.into_iter(), &full),
            Some(InterfaceId::of::<dyn Ledger>())
        );
        assert_eq!(find(ids.into_iter(), "Missing"), None);
    }
}
