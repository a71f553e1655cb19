//! Interceptors observe every dispatched call; transaction listeners observe
//! transaction boundaries.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{ContextId, InterfaceId};
use context::{ComponentRef, TransactionBehavior, TransactionContext};

use crate::component::ComponentDescriptor;
use crate::error::ServiceError;

/// Describes one dispatched call as seen by interceptors.
#[derive(Debug, Clone)]
pub struct ServiceCall {
    target: InterfaceId,
    component: ComponentRef,
    service_method: String,
    parameters: serde_json::Value,
    behavior: TransactionBehavior,
    context_id: ContextId,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ServiceCall {
    pub fn new(
        target: InterfaceId,
        component: ComponentRef,
        service_method: impl Into<String>,
        parameters: serde_json::Value,
        behavior: TransactionBehavior,
        context_id: ContextId,
    ) -> Self {
        Self {
            target,
            component,
            service_method: service_method.into(),
            parameters,
            behavior,
            context_id,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn target(&self) -> InterfaceId {
        self.target
    }

    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    pub fn parameters(&self) -> &serde_json::Value {
        &self.parameters
    }

    pub fn behavior(&self) -> TransactionBehavior {
        self.behavior
    }

    pub fn context_id(&self) -> ContextId {
        self.context_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Set once the target returned; `None` while interceptors run `pre_call`.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub(crate) fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }
}

/// What a call produced, as passed to [`ServiceChannelInterceptor::post_call`].
#[derive(Debug, Clone, Copy)]
pub enum CallOutcome<'a> {
    Returned(&'a (dyn Any + Send)),
    Failed(&'a ServiceError),
}

impl<'a> CallOutcome<'a> {
    pub fn is_failure(&self) -> bool {
        matches!(self, CallOutcome::Failed(_))
    }

    pub fn error(&self) -> Option<&'a ServiceError> {
        match self {
            CallOutcome::Returned(_) => None,
            CallOutcome::Failed(e) => Some(e),
        }
    }

    /// Returns the call result if it has type `T`.
    pub fn value<T: 'static>(&self) -> Option<&'a T> {
        match self {
            CallOutcome::Returned(value) => value.downcast_ref::<T>(),
            CallOutcome::Failed(_) => None,
        }
    }
}

/// Cross-cutting concern notified immediately before and after every call.
///
/// A failing `pre_call` aborts the call; the failure is classified exactly
/// like a failure of the target itself.
pub trait ServiceChannelInterceptor: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn pre_call(&self, _call: &ServiceCall) -> Result<(), ServiceError> {
        Ok(())
    }

    fn post_call(&self, _call: &ServiceCall, _outcome: CallOutcome<'_>) {}
}

/// Notified when the dispatcher starts or completes a transaction.
pub trait TransactionListener: Send + Sync {
    fn transaction_started(&self, _transaction: &TransactionContext) {}

    fn transaction_committing(&self, _transaction: &TransactionContext) {}

    fn transaction_rolling_back(&self, _transaction: &TransactionContext) {}
}

/// Global interceptors, combined with a component's own interceptors at call
/// time. Global interceptors always run first.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    global: Vec<Arc<dyn ServiceChannelInterceptor>>,
}

impl InterceptorChain {
    pub fn new(global: Vec<Arc<dyn ServiceChannelInterceptor>>) -> Self {
        Self { global }
    }

    pub fn push(&mut self, interceptor: Arc<dyn ServiceChannelInterceptor>) {
        self.global.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    /// Returns the interceptors for a call to `component`, in notification
    /// order.
    pub fn for_component<'a>(
        &'a self,
        component: &'a ComponentDescriptor,
    ) -> impl Iterator<Item = &'a Arc<dyn ServiceChannelInterceptor>> + 'a {
        self.global.iter().chain(component.interceptors().iter())
    }

    /// Runs `pre_call` on every interceptor, stopping at the first failure.
    pub fn pre_call(
        &self,
        component: &ComponentDescriptor,
        call: &ServiceCall,
    ) -> Result<(), ServiceError> {
        for interceptor in self.for_component(component) {
            interceptor.pre_call(call).inspect_err(|e| {
                tracing::debug!(
                    interceptor = interceptor.name(),
                    service_method = call.service_method(),
                    error = %e,
                    "Interceptor rejected call"
                );
            })?;
        }
        Ok(())
    }

    pub fn post_call(
        &self,
        component: &ComponentDescriptor,
        call: &ServiceCall,
        outcome: CallOutcome<'_>,
    ) {
        for interceptor in self.for_component(component) {
            interceptor.post_call(call, outcome);
        }
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.global.iter().map(|i| i.name()))
            .finish()
    }
}

/// Writes an audit trail of every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingInterceptor;

impl ServiceChannelInterceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn pre_call(&self, call: &ServiceCall) -> Result<(), ServiceError> {
        tracing::info!(
            service = call.target().short_name(),
            service_method = call.service_method(),
            component = call.component().name(),
            behavior = %call.behavior(),
            context_id = %call.context_id(),
            "Service call started"
        );
        Ok(())
    }

    fn post_call(&self, call: &ServiceCall, outcome: CallOutcome<'_>) {
        let duration_ms = call
            .completed_at()
            .map(|end| (end - call.started_at()).num_milliseconds())
            .unwrap_or_default();
        match outcome.error() {
            None => tracing::info!(
                service = call.target().short_name(),
                service_method = call.service_method(),
                duration_ms,
                "Service call completed"
            ),
            Some(e) => tracing::warn!(
                service = call.target().short_name(),
                service_method = call.service_method(),
                duration_ms,
                class = e.class(),
                error = %e,
                "Service call failed"
            ),
        }
    }
}
