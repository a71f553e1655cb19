//! Commands: one method call on a service, ready for dispatch.

use std::future::Future;
use std::sync::Arc;

use context::{ApplicationInfo, SessionContext};
use futures_util::future::BoxFuture;

use crate::error::ServiceError;

/// Where a call tree originated. Only used for root calls; nested calls
/// inherit application and session from their parent context.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub application: Option<ApplicationInfo>,
    pub session: Option<SessionContext>,
}

impl Origin {
    pub fn new(application: ApplicationInfo) -> Self {
        Self {
            application: Some(application),
            session: None,
        }
    }

    pub fn with_session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }
}

type Operation<S, R> =
    Box<dyn FnOnce(Arc<S>) -> BoxFuture<'static, Result<R, ServiceError>> + Send>;

/// A call of `service_method` on service interface `S` returning `R`.
///
/// The operation only runs after every interceptor accepted the call.
/// Parameters are informational and only exposed to interceptors.
pub struct Command<S: ?Sized, R> {
    service_method: String,
    parameters: serde_json::Value,
    origin: Option<Origin>,
    operation: Operation<S, R>,
}

impl<S, R> Command<S, R>
where
    S: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new<F, Fut>(service_method: impl Into<String>, operation: F) -> Self
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R, ServiceError>> + Send + 'static,
    {
        Self {
            service_method: service_method.into(),
            parameters: serde_json::Value::Null,
            origin: None,
            operation: Box::new(move |service| Box::pin(operation(service))),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }

    pub(crate) fn into_parts(
        self,
    ) -> (String, serde_json::Value, Option<Origin>, Operation<S, R>) {
        (
            self.service_method,
            self.parameters,
            self.origin,
            self.operation,
        )
    }
}

impl<S: ?Sized, R> std::fmt::Debug for Command<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("service_method", &self.service_method)
            .field("parameters", &self.parameters)
            .finish()
    }
}
