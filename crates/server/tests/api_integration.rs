//! Integration tests for the runtime server.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use channel::{
    BusinessError, CheckLevel, ComponentDescriptor, HealthCheckResult, Injectable, ServiceChannel,
    ServiceError, ServiceImplementation, ServiceInstance, ServiceProviderEntry,
    ServiceProviderImplementation,
};
use common::ErasedHandle;
use lifecycle::{
    LifecycleManager, RuntimeConfig, RuntimeSettings, ServiceFactory, ServiceProviderFactory,
    StaticComponentFactory,
};
use metrics_exporter_prometheus::PrometheusHandle;
use server::routes::AppState;
use server::status::{RuntimeStatus, status_component};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

// A service whose check always fails with a business error.
trait Flaky: Send + Sync {}

struct FlakyService;

impl Flaky for FlakyService {}

impl Injectable for FlakyService {}

#[async_trait]
impl ServiceImplementation for FlakyService {
    async fn check(&self, _level: CheckLevel) -> Result<Option<HealthCheckResult>, ServiceError> {
        Err(BusinessError::new("FLAKY-1", "upstream is down").into())
    }
}

struct FlakyFactory;

impl ServiceFactory for FlakyFactory {
    fn create_service(&self) -> lifecycle::Result<ServiceInstance> {
        let service = Arc::new(FlakyService);
        Ok(ServiceInstance::new::<dyn Flaky>(service.clone(), service))
    }

    fn create_proxy(&self, _channel: &ServiceChannel) -> ErasedHandle {
        ErasedHandle::new::<dyn Flaky>(Arc::new(FlakyService))
    }
}

trait Mailer: Send + Sync {}

struct SmtpMailer;

impl Mailer for SmtpMailer {}

impl Injectable for SmtpMailer {}

#[async_trait]
impl ServiceProviderImplementation for SmtpMailer {
    async fn check(&self, level: CheckLevel) -> Result<Option<HealthCheckResult>, ServiceError> {
        Ok(Some(HealthCheckResult::warning(format!(
            "{level} check: queue is filling up"
        ))))
    }
}

struct MailerFactory;

impl ServiceProviderFactory for MailerFactory {
    fn create_service_provider(&self) -> lifecycle::Result<ServiceProviderEntry> {
        let mailer = Arc::new(SmtpMailer);
        Ok(ServiceProviderEntry::new::<dyn Mailer>(mailer.clone(), mailer))
    }
}

fn manager() -> Arc<LifecycleManager> {
    let settings = RuntimeSettings {
        application_name: "ops".to_string(),
        application_version: "1.2.3".to_string(),
        ..RuntimeSettings::default()
    };
    let config = RuntimeConfig::builder()
        .settings(settings)
        .service_provider(Arc::new(MailerFactory))
        .component(status_component())
        .component(Arc::new(
            StaticComponentFactory::new(ComponentDescriptor::new("flaky"))
                .with_service(Arc::new(FlakyFactory)),
        ))
        .build();
    Arc::new(LifecycleManager::local(config))
}

async fn setup() -> (axum::Router, Arc<LifecycleManager>) {
    let manager = manager();
    manager.initialize().await.unwrap();
    let app = server::create_app(
        Arc::new(AppState {
            manager: manager.clone(),
        }),
        get_metrics_handle(),
    );
    (app, manager)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["lifecycle"], "Initialized");
    assert_eq!(json["application"], "ops");
    assert_eq!(json["version"], "1.2.3");
}

#[tokio::test]
async fn test_health_check_before_initialize() {
    let manager = manager();
    let app = server::create_app(Arc::new(AppState { manager }), get_metrics_handle());

    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unavailable");
    assert_eq!(json["lifecycle"], "NotInitialized");
}

#[tokio::test]
async fn test_health_check_after_shutdown() {
    let (app, manager) = setup().await;
    manager.shutdown().await.unwrap();

    let (status, json) = get_json(app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["lifecycle"], "Shutdown");
}

#[tokio::test]
async fn test_list_components() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/components").await;

    assert_eq!(status, StatusCode::OK);
    let components = json.as_array().unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0]["name"], "runtime-status");
    assert_eq!(components[0]["layer"], "infrastructure");
    assert_eq!(components[0]["default_behavior"], "Supports");
    assert_eq!(components[0]["description"], "Reports runtime uptime");
    assert_eq!(components[1]["name"], "flaky");
    assert!(components[1]["description"].is_null());
}

#[tokio::test]
async fn test_list_services() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/services").await;

    assert_eq!(status, StatusCode::OK);
    let services = json.as_array().unwrap();
    assert_eq!(services.len(), 2);
    assert_eq!(services[0]["name"], "Flaky");
    assert_eq!(services[0]["component"], "flaky");
    assert_eq!(services[1]["name"], "RuntimeStatus");
    assert_eq!(services[1]["component"], "runtime-status");
}

#[tokio::test]
async fn test_check_service() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/services/RuntimeStatus/check?level=external").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], "RuntimeStatus");
    assert_eq!(json["level"], "external");
    assert_eq!(json["result"]["status"], "ok");
    assert_eq!(json["result"]["messages"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_check_service_reports_business_failure_as_error_result() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/services/Flaky/check").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["level"], "internal");
    assert_eq!(json["result"]["status"], "error");
}

#[tokio::test]
async fn test_check_unknown_service() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/services/Nope/check").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("Nope"));
}

#[tokio::test]
async fn test_check_with_invalid_level() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/services/RuntimeStatus/check?level=deep").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("deep"));
}

#[tokio::test]
async fn test_check_after_shutdown_is_unavailable() {
    let (app, manager) = setup().await;
    manager.shutdown().await.unwrap();

    let (status, _json) = get_json(app, "/services/RuntimeStatus/check").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_check_service_provider() {
    let (app, _manager) = setup().await;

    let (status, json) = get_json(app, "/service-providers/Mailer/check?level=internal").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["result"]["status"], "warning");
    assert_eq!(
        json["result"]["messages"][0],
        "internal check: queue is filling up"
    );
}

#[tokio::test]
async fn test_status_service_through_proxy() {
    let (_app, manager) = setup().await;

    let status = manager.service::<dyn RuntimeStatus>().unwrap();
    let report = status.report().await.unwrap();

    assert!(report.uptime_secs >= 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, manager) = setup().await;
    let status = manager.service::<dyn RuntimeStatus>().unwrap();
    status.report().await.unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("service_calls_total"));
}
