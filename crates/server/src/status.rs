//! Built-in status component hosted by every server runtime.

use std::sync::Arc;

use async_trait::async_trait;
use channel::{
    CheckLevel, Command, ComponentDescriptor, HealthCheckResult, Injectable, Layer,
    LoggingInterceptor, ServiceChannel, ServiceError, ServiceImplementation, ServiceInstance,
};
use chrono::{DateTime, Utc};
use common::ErasedHandle;
use context::TransactionBehavior;
use lifecycle::{
    ComponentFactory, RuntimeConfig, RuntimeSettings, ServiceFactory, StaticComponentFactory,
};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RuntimeStatusReport {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
}

/// Reports how long the runtime has been running.
#[async_trait]
pub trait RuntimeStatus: Send + Sync {
    async fn report(&self) -> Result<RuntimeStatusReport, ServiceError>;
}

pub struct RuntimeStatusService {
    started_at: DateTime<Utc>,
}

impl RuntimeStatusService {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
        }
    }
}

impl Default for RuntimeStatusService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuntimeStatus for RuntimeStatusService {
    async fn report(&self) -> Result<RuntimeStatusReport, ServiceError> {
        Ok(RuntimeStatusReport {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
        })
    }
}

impl Injectable for RuntimeStatusService {}

#[async_trait]
impl ServiceImplementation for RuntimeStatusService {
    async fn check(&self, level: CheckLevel) -> Result<Option<HealthCheckResult>, ServiceError> {
        let mut result = HealthCheckResult::ok();
        if level == CheckLevel::External {
            result
                .messages
                .push(format!("running since {}", self.started_at.to_rfc3339()));
        }
        Ok(Some(result))
    }
}

struct RuntimeStatusProxy(ServiceChannel);

#[async_trait]
impl RuntimeStatus for RuntimeStatusProxy {
    async fn report(&self) -> Result<RuntimeStatusReport, ServiceError> {
        self.0
            .call(Command::new(
                "report",
                |status: Arc<dyn RuntimeStatus>| async move { status.report().await },
            ))
            .await
    }
}

struct RuntimeStatusFactory;

impl ServiceFactory for RuntimeStatusFactory {
    fn create_service(&self) -> lifecycle::Result<ServiceInstance> {
        let service = Arc::new(RuntimeStatusService::new());
        Ok(ServiceInstance::new::<dyn RuntimeStatus>(
            service.clone(),
            service,
        ))
    }

    fn create_proxy(&self, channel: &ServiceChannel) -> ErasedHandle {
        ErasedHandle::new::<dyn RuntimeStatus>(Arc::new(RuntimeStatusProxy(channel.clone())))
    }
}

pub fn status_component() -> Arc<dyn ComponentFactory> {
    Arc::new(
        StaticComponentFactory::new(
            ComponentDescriptor::new("runtime-status")
                .with_description("Reports runtime uptime")
                .with_layer(Layer::Infrastructure)
                .with_default_behavior(TransactionBehavior::Supports),
        )
        .with_service(Arc::new(RuntimeStatusFactory)),
    )
}

/// Runtime configuration of the server: the status component and call
/// logging on every service.
pub fn runtime_config(settings: RuntimeSettings) -> RuntimeConfig {
    RuntimeConfig::builder()
        .settings(settings)
        .component(status_component())
        .interceptor(Arc::new(LoggingInterceptor))
        .build()
}
