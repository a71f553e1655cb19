//! The transactional invocation dispatcher.
//!
//! Every service call goes through [`ServiceChannel::invoke`]. The channel
//! pushes an invocation context, applies the transaction transition for the
//! requested behaviour, runs the interceptors and the target, classifies
//! the outcome and finally completes the transaction and pops the context.
//! The cleanup runs exactly once on every exit path, including panics in
//! the target and cancellation of the calling future.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use common::InterfaceId;
use context::{
    AnonymousPrincipalProvider, ApplicationInfo, ExecutionScope, InvocationContext,
    InvocationTarget, PrincipalProvider, TraceSink, TracingSink, TransactionBehavior,
    TransactionContext, TransitionDecision, TxOutcome, decide,
};
use futures_util::FutureExt;

use crate::command::{Command, Origin};
use crate::component::ComponentDescriptor;
use crate::error::{RegistryError, ServiceError, SystemError};
use crate::health::{CheckLevel, HealthCheckResult};
use crate::interceptor::{
    CallOutcome, InterceptorChain, ServiceCall, ServiceChannelInterceptor, TransactionListener,
};
use crate::platform::{ChannelPlatform, LocalPlatform};
use crate::registry::{ServiceEntry, ServiceRegistry};

struct ChannelInner {
    registry: OnceLock<Arc<dyn ServiceRegistry>>,
    platform: Arc<dyn ChannelPlatform>,
    interceptors: InterceptorChain,
    listeners: Vec<Arc<dyn TransactionListener>>,
    principals: Arc<dyn PrincipalProvider>,
    application: ApplicationInfo,
    sink: Arc<dyn TraceSink>,
    closed: AtomicBool,
}

/// Builds a [`ServiceChannel`].
pub struct ServiceChannelBuilder {
    platform: Arc<dyn ChannelPlatform>,
    interceptors: InterceptorChain,
    listeners: Vec<Arc<dyn TransactionListener>>,
    principals: Arc<dyn PrincipalProvider>,
    application: ApplicationInfo,
    sink: Arc<dyn TraceSink>,
}

impl ServiceChannelBuilder {
    pub fn platform(mut self, platform: Arc<dyn ChannelPlatform>) -> Self {
        self.platform = platform;
        self
    }

    /// Adds a global interceptor. Global interceptors see every call, before
    /// the interceptors of the called component.
    pub fn interceptor(mut self, interceptor: Arc<dyn ServiceChannelInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn TransactionListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn principals(mut self, principals: Arc<dyn PrincipalProvider>) -> Self {
        self.principals = principals;
        self
    }

    /// Sets the application reported for root calls without an origin.
    pub fn application(mut self, application: ApplicationInfo) -> Self {
        self.application = application;
        self
    }

    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> ServiceChannel {
        ServiceChannel {
            inner: Arc::new(ChannelInner {
                registry: OnceLock::new(),
                platform: self.platform,
                interceptors: self.interceptors,
                listeners: self.listeners,
                principals: self.principals,
                application: self.application,
                sink: self.sink,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for ServiceChannelBuilder {
    fn default() -> Self {
        Self {
            platform: Arc::new(LocalPlatform::default()),
            interceptors: InterceptorChain::default(),
            listeners: Vec::new(),
            principals: Arc::new(AnonymousPrincipalProvider),
            application: ApplicationInfo::default(),
            sink: Arc::new(TracingSink),
        }
    }
}

/// Entry point for every service call.
///
/// Cloning yields another handle to the same channel. Service proxies hold
/// a clone and forward each method to one of the `call_*` operations.
#[derive(Clone)]
pub struct ServiceChannel {
    inner: Arc<ChannelInner>,
}

impl ServiceChannel {
    pub fn builder() -> ServiceChannelBuilder {
        ServiceChannelBuilder::default()
    }

    /// Attaches the registry the channel dispatches to. A channel accepts
    /// calls only after a registry was attached, and only one can be.
    pub fn attach(&self, registry: Arc<dyn ServiceRegistry>) -> Result<(), SystemError> {
        self.inner
            .registry
            .set(registry)
            .map_err(|_| SystemError::RegistryAlreadyAttached)
    }

    /// Stops accepting calls. Lookups fail with `ServiceNotAvailable`
    /// afterwards.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::Acquire) && self.inner.registry.get().is_some()
    }

    /// Returns the attached registry.
    pub fn registry(&self) -> Option<Arc<dyn ServiceRegistry>> {
        self.inner.registry.get().cloned()
    }

    pub fn platform(&self) -> &Arc<dyn ChannelPlatform> {
        &self.inner.platform
    }

    pub fn application(&self) -> &ApplicationInfo {
        &self.inner.application
    }

    fn lookup(&self, interface: InterfaceId) -> Result<ServiceEntry, RegistryError> {
        match self.inner.registry.get() {
            Some(registry) if !self.inner.closed.load(Ordering::Acquire) => {
                registry.entry(interface)
            }
            _ => Err(RegistryError::ServiceNotAvailable {
                interface: interface.to_string(),
            }),
        }
    }

    pub async fn call_not_supported<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::NotSupported).await
    }

    pub async fn call_supports<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::Supports).await
    }

    pub async fn call_required<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::Required).await
    }

    pub async fn call_requires_new<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::RequiresNew).await
    }

    pub async fn call_mandatory<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::Mandatory).await
    }

    pub async fn call_never<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        self.invoke(command, TransactionBehavior::Never).await
    }

    /// Calls with the default behaviour of the component owning `S`.
    pub async fn call<S, R>(&self, command: Command<S, R>) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        let behavior = self
            .lookup(InterfaceId::of::<S>())?
            .component()
            .default_behavior();
        self.invoke(command, behavior).await
    }

    /// Dispatches `command` to the implementation of service interface `S`.
    pub async fn invoke<S, R>(
        &self,
        command: Command<S, R>,
        behavior: TransactionBehavior,
    ) -> Result<R, ServiceError>
    where
        S: ?Sized + Send + Sync + 'static,
        R: Send + 'static,
    {
        let entry = self.lookup(InterfaceId::of::<S>())?;
        let service = entry.instance().downcast::<S>().ok_or_else(|| {
            RegistryError::ServiceTypeMismatch {
                interface: entry.interface().to_string(),
            }
        })?;
        let (service_method, parameters, origin, operation) = command.into_parts();

        let request = Request {
            entry,
            service_method,
            parameters,
            origin,
            behavior,
        };
        self.dispatch_in_scope(request, operation(service)).await
    }

    /// Runs the health check of service `interface` in its own transaction.
    ///
    /// Business and system failures of the check are reported as an error
    /// result. Fatal failures propagate.
    pub async fn check_service(
        &self,
        interface: InterfaceId,
        level: CheckLevel,
    ) -> Result<Option<HealthCheckResult>, ServiceError> {
        let entry = self.lookup(interface)?;
        let implementation = entry.implementation().clone();
        let request = Request {
            entry,
            service_method: "check_service".to_string(),
            parameters: serde_json::json!({ "level": level }),
            origin: None,
            behavior: TransactionBehavior::RequiresNew,
        };

        let result = self
            .dispatch_in_scope(request, async move { implementation.check(level).await })
            .await;

        match result {
            Err(e) if !e.is_fatal() => {
                tracing::warn!(
                    service = interface.short_name(),
                    level = %level,
                    error = %e,
                    "Service check failed"
                );
                Ok(Some(HealthCheckResult::error(e.to_string())))
            }
            other => other,
        }
    }

    /// Runs the call in a fork of the caller's scope, or in a fresh scope
    /// for a root call. The caller's view is never touched.
    async fn dispatch_in_scope<R, F>(&self, request: Request, target: F) -> Result<R, ServiceError>
    where
        R: Send + 'static,
        F: Future<Output = Result<R, ServiceError>> + Send,
    {
        let scope = match ExecutionScope::current() {
            Some(caller) => caller.fork(),
            None => ExecutionScope::with_sink(self.inner.sink.clone()),
        };
        scope
            .clone()
            .run(self.dispatch(scope, request, target))
            .await
    }

    #[tracing::instrument(
        skip_all,
        fields(
            service = request.entry.interface().short_name(),
            service_method = %request.service_method,
            behavior = %request.behavior,
        )
    )]
    async fn dispatch<R, F>(
        &self,
        scope: ExecutionScope,
        request: Request,
        target: F,
    ) -> Result<R, ServiceError>
    where
        R: Send + 'static,
        F: Future<Output = Result<R, ServiceError>> + Send,
    {
        let started = Instant::now();
        let Request {
            entry,
            service_method,
            parameters,
            origin,
            behavior,
        } = request;
        let interface = entry.interface();
        let component = entry.component().clone();
        metrics::counter!("service_calls_total", "service" => interface.short_name()).increment(1);

        // Nested calls inherit application and session from their caller.
        let (invoking_application, session) = match scope.current_context() {
            Some(parent) => (
                parent.invoking_application()?.clone(),
                parent.session()?.cloned(),
            ),
            None => {
                let origin = origin.unwrap_or_default();
                (
                    origin
                        .application
                        .unwrap_or_else(|| self.inner.application.clone()),
                    origin.session,
                )
            }
        };

        let context = self.inner.platform.create_invocation_context(
            &scope,
            InvocationTarget {
                target: interface,
                component: component.reference().clone(),
                invoking_application,
                session,
                behavior,
            },
            self.inner.principals.as_ref(),
        );
        let mut frame = CallFrame::new(&self.inner, scope.clone(), context.clone());
        let mut call = ServiceCall::new(
            interface,
            component.reference().clone(),
            service_method,
            parameters,
            behavior,
            context.id(),
        );

        let status = scope.status();
        let decision = decide(status, behavior);
        let result = if decision == TransitionDecision::Invalid {
            Err(SystemError::InvalidTransactionTransition { behavior, status }.into())
        } else if let Err(e) = frame.begin(decision) {
            let e = ServiceError::from(e);
            frame.fail(&e);
            Err(e)
        } else {
            let result = self
                .execute(&scope, &component, &call, behavior, target)
                .await;
            if let Err(e) = &result {
                frame.fail(e);
            }
            call.complete();
            self.notify_post_call(&component, &call, &result);
            result
        };

        let release = frame.finish();
        let result = match (result, release) {
            (result, Ok(())) => result,
            (Ok(_), Err(release)) => Err(release.into()),
            (Err(e), Err(release)) => {
                tracing::error!(
                    error = %e,
                    release_error = %release,
                    "Transaction release failed after failed call"
                );
                Err(e)
            }
        };

        metrics::histogram!("service_call_duration_seconds", "service" => interface.short_name())
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::counter!("service_call_failures_total", "class" => e.class()).increment(1);
        }
        result
    }

    /// Runs the interceptors and the target, then inspects the rollback flag.
    async fn execute<R, F>(
        &self,
        scope: &ExecutionScope,
        component: &ComponentDescriptor,
        call: &ServiceCall,
        behavior: TransactionBehavior,
        target: F,
    ) -> Result<R, ServiceError>
    where
        F: Future<Output = Result<R, ServiceError>> + Send,
    {
        let body = async {
            self.inner.interceptors.pre_call(component, call)?;
            target.await
        };
        let value = match AssertUnwindSafe(body).catch_unwind().await {
            Ok(result) => result?,
            Err(panic) => {
                return Err(ServiceError::Fatal {
                    service_method: call.service_method().to_string(),
                    message: panic_message(panic.as_ref()),
                });
            }
        };

        if behavior.permits_rollback_inspection() {
            if let Some(transaction) = scope.transaction() {
                if transaction.is_rollback_only()? {
                    return Err(SystemError::TransactionMarkedForRollback {
                        service_method: call.service_method().to_string(),
                    }
                    .into());
                }
            }
        }
        Ok(value)
    }

    fn notify_post_call<R: Send + 'static>(
        &self,
        component: &ComponentDescriptor,
        call: &ServiceCall,
        result: &Result<R, ServiceError>,
    ) {
        let outcome = match result {
            Ok(value) => CallOutcome::Returned(value as &(dyn Any + Send)),
            Err(e) => CallOutcome::Failed(e),
        };
        let notified = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.inner.interceptors.post_call(component, call, outcome)
        }));
        if let Err(panic) = notified {
            tracing::error!(
                service_method = call.service_method(),
                panic = %panic_message(panic.as_ref()),
                "Interceptor panicked in post_call"
            );
        }
    }
}

impl std::fmt::Debug for ServiceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceChannel")
            .field("platform", &self.inner.platform.name())
            .field("interceptors", &self.inner.interceptors)
            .field("listeners", &self.inner.listeners.len())
            .field("open", &self.is_open())
            .finish()
    }
}

struct Request {
    entry: ServiceEntry,
    service_method: String,
    parameters: serde_json::Value,
    origin: Option<Origin>,
    behavior: TransactionBehavior,
}

/// Transaction and context state of one call, restored exactly once.
struct CallFrame<'a> {
    channel: &'a ChannelInner,
    scope: ExecutionScope,
    context: InvocationContext,
    decision: TransitionDecision,
    created: Option<Arc<TransactionContext>>,
    previous: Option<Arc<TransactionContext>>,
    suspended: Option<Arc<TransactionContext>>,
    finished: bool,
}

impl<'a> CallFrame<'a> {
    fn new(channel: &'a ChannelInner, scope: ExecutionScope, context: InvocationContext) -> Self {
        Self {
            channel,
            scope,
            context,
            decision: TransitionDecision::Unchanged,
            created: None,
            previous: None,
            suspended: None,
            finished: false,
        }
    }

    fn begin(&mut self, decision: TransitionDecision) -> Result<(), SystemError> {
        match decision {
            TransitionDecision::NewRequired => {
                let transaction = self.channel.platform.create_transaction_context()?;
                self.previous = self.scope.bind_transaction(transaction.clone());
                self.decision = decision;
                for listener in &self.channel.listeners {
                    listener.transaction_started(&transaction);
                }
                metrics::counter!("transactions_started_total").increment(1);
                tracing::debug!(transaction_id = %transaction.id(), "Transaction started");
                self.created = Some(transaction);
            }
            TransitionDecision::SuspendRequired => {
                self.suspended = self.scope.unbind_transaction();
                self.decision = decision;
            }
            TransitionDecision::Unchanged | TransitionDecision::Invalid => {}
        }
        Ok(())
    }

    /// Marks the bound transaction for rollback unless `error` is a business
    /// failure.
    fn fail(&self, error: &ServiceError) {
        if error.is_business() {
            return;
        }
        if self.decision == TransitionDecision::NewRequired {
            tracing::warn!(
                class = error.class(),
                error = %error,
                "Rolling back transaction after failed call"
            );
        }
        self.mark_rollback();
    }

    fn mark_rollback(&self) {
        if let Some(transaction) = self.scope.transaction() {
            if let Err(e) = transaction.set_rollback_only() {
                tracing::error!(error = %e, "Failed to mark transaction for rollback");
            }
        }
    }

    fn finish(&mut self) -> Result<(), SystemError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let mut first_error = None;
        match self.decision {
            TransitionDecision::NewRequired => {
                if let Some(transaction) = self.created.take() {
                    let outcome = transaction.outcome();
                    for listener in &self.channel.listeners {
                        match outcome {
                            TxOutcome::Commit => listener.transaction_committing(&transaction),
                            TxOutcome::Rollback => listener.transaction_rolling_back(&transaction),
                        }
                    }
                    if let Err(e) = self
                        .channel
                        .platform
                        .release_transaction_context(&transaction)
                    {
                        first_error = Some(e);
                    }
                    self.scope.restore_transaction(self.previous.take());
                    transaction.invalidate();
                    metrics::counter!("transactions_completed_total", "outcome" => outcome.as_str())
                        .increment(1);
                    tracing::debug!(
                        transaction_id = %transaction.id(),
                        outcome = %outcome,
                        "Transaction completed"
                    );
                }
            }
            TransitionDecision::SuspendRequired => {
                self.scope.restore_transaction(self.suspended.take());
            }
            TransitionDecision::Unchanged | TransitionDecision::Invalid => {}
        }

        if let Err(e) = self.scope.pop(&self.context) {
            first_error.get_or_insert(e.into());
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // The call was abandoned before it completed.
        self.mark_rollback();
        if let Err(e) = self.finish() {
            tracing::error!(error = %e, "Cleanup of abandoned call failed");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
