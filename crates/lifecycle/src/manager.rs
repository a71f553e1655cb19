//! The lifecycle manager: bootstrap, introspection and shutdown of a
//! runtime.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use channel::{
    ActivityRegistry, CheckLevel, ComponentDescriptor, DependencyInjector, HealthCheckResult,
    InMemoryServiceRegistry, RegistryError, ServiceChannel, ServiceDirectoryExt, ServiceEntry,
    ServiceError, ServiceProviderRegistry, ServiceRegistry,
};
use common::InterfaceId;
use context::ExecutionScope;
use tokio::sync::Mutex;

use crate::config::{RuntimeConfig, RuntimeSettings};
use crate::environment::{Environment, LocalEnvironment};
use crate::error::{LifecycleError, Result};
use crate::state::LifecycleState;
use crate::trigger::{Scheduler, TriggerSet};

/// Registries and channel of a bootstrapped runtime.
struct Runtime {
    channel: ServiceChannel,
    services: Arc<InMemoryServiceRegistry>,
    providers: ServiceProviderRegistry,
    activities: ActivityRegistry,
    components: Vec<Arc<ComponentDescriptor>>,
}

#[derive(Default)]
struct Inner {
    state: LifecycleState,
    runtime: Option<Arc<Runtime>>,
}

/// Owns a runtime from bootstrap to shutdown.
///
/// Bootstrap order:
/// 1. service providers, initialized inside the bootstrap transaction
/// 2. components and their services (implementation plus proxy)
/// 3. activities
/// 4. dependency injection into services, then providers, then activities
///
/// Registries are frozen once bootstrap succeeds.
pub struct LifecycleManager {
    config: RuntimeConfig,
    environment: Arc<dyn Environment>,
    triggers: Arc<TriggerSet>,
    inner: RwLock<Inner>,
    scheduler: Mutex<Option<Scheduler>>,
    transition: Mutex<()>,
}

impl LifecycleManager {
    pub fn new(config: RuntimeConfig, environment: Arc<dyn Environment>) -> Self {
        let triggers = Arc::new(TriggerSet::new(config.triggers.clone()));
        Self {
            config,
            environment,
            triggers,
            inner: RwLock::new(Inner::default()),
            scheduler: Mutex::new(None),
            transition: Mutex::new(()),
        }
    }

    /// Creates a manager for a standalone process.
    pub fn local(config: RuntimeConfig) -> Self {
        Self::new(config, Arc::new(LocalEnvironment::default()))
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.config.settings
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.environment
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.read().state
    }

    pub fn is_initialized(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Initialized
    }

    /// Bootstraps the runtime. Does nothing if it is already initialized.
    ///
    /// On failure everything created so far is dropped and the runtime
    /// stays `NotInitialized`.
    #[tracing::instrument(skip(self), fields(environment = self.environment.name()))]
    pub async fn initialize(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        let state = self.lifecycle_state();
        if state == LifecycleState::Initialized {
            tracing::debug!("Runtime already initialized");
            return Ok(());
        }
        if !state.can_initialize() {
            return Err(LifecycleError::InvalidState {
                operation: "initialize",
                state,
            });
        }

        let started = Instant::now();
        match self.bootstrap().await {
            Ok(runtime) => {
                tracing::info!(
                    components = runtime.components.len(),
                    services = runtime.services.len(),
                    service_providers = runtime.providers.len(),
                    activities = runtime.activities.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Runtime initialized"
                );
                {
                    let mut inner = self.write();
                    inner.runtime = Some(Arc::new(runtime));
                    inner.state = LifecycleState::Initialized;
                }
                self.start_scheduler().await;
                metrics::counter!("lifecycle_initializations_total", "outcome" => "success")
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, code = %e.code(), "Runtime initialization failed");
                metrics::counter!("lifecycle_initializations_total", "outcome" => "failure")
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Shuts the runtime down: stops the trigger scheduler, closes the
    /// channel and lets the environment clean up.
    #[tracing::instrument(skip(self), fields(environment = self.environment.name()))]
    pub async fn shutdown(&self) -> Result<()> {
        let _transition = self.transition.lock().await;

        let state = self.lifecycle_state();
        if !state.can_shutdown() {
            return Err(LifecycleError::InvalidState {
                operation: "shut down",
                state,
            });
        }

        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.stop().await;
        }

        let runtime = {
            let mut inner = self.write();
            inner.state = LifecycleState::Shutdown;
            inner.runtime.clone()
        };
        if let Some(runtime) = runtime {
            runtime.channel.close();
        }

        self.environment.perform_shutdown()?;
        tracing::info!("Runtime shut down");
        Ok(())
    }

    /// Runs one trigger cycle. Concurrent calls are serialized.
    pub async fn fire_triggers(&self) {
        self.triggers.fire().await;
    }

    /// Whether triggers are fired by the runtime's own scheduler.
    pub fn supports_scheduling(&self) -> bool {
        self.config.settings.scheduling_enabled && self.environment.supports_scheduling()
    }

    pub fn channel(&self) -> Option<ServiceChannel> {
        self.runtime().map(|r| r.channel.clone())
    }

    /// The service registry, once the runtime is initialized.
    pub fn service_registry(&self) -> Option<Arc<dyn ServiceRegistry>> {
        self.runtime()
            .map(|r| r.services.clone() as Arc<dyn ServiceRegistry>)
    }

    pub fn components(&self) -> Vec<Arc<ComponentDescriptor>> {
        self.runtime()
            .map(|r| r.components.clone())
            .unwrap_or_default()
    }

    pub fn services(&self) -> Vec<ServiceEntry> {
        self.runtime()
            .map(|r| r.services.entries())
            .unwrap_or_default()
    }

    pub fn service_providers(&self) -> Vec<InterfaceId> {
        self.runtime()
            .map(|r| r.providers.interfaces())
            .unwrap_or_default()
    }

    pub fn activities(&self) -> Vec<InterfaceId> {
        self.runtime()
            .map(|r| r.activities.interfaces())
            .unwrap_or_default()
    }

    /// Returns the proxy of service `T`.
    pub fn service<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> std::result::Result<Arc<T>, RegistryError> {
        match self.runtime() {
            Some(runtime) => runtime.services.proxy_of::<T>(),
            None => Err(RegistryError::ServiceNotAvailable {
                interface: InterfaceId::of::<T>().to_string(),
            }),
        }
    }

    pub fn service_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> std::result::Result<Arc<T>, RegistryError> {
        match self.runtime() {
            Some(runtime) => runtime.providers.get::<T>(),
            None => Err(RegistryError::ServiceProviderNotAvailable {
                interface: InterfaceId::of::<T>().to_string(),
            }),
        }
    }

    pub fn activity<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> std::result::Result<Arc<T>, RegistryError> {
        match self.runtime() {
            Some(runtime) => runtime.activities.get::<T>(),
            None => Err(RegistryError::ActivityNotAvailable {
                interface: InterfaceId::of::<T>().to_string(),
            }),
        }
    }

    /// Checks a service through the channel, in its own transaction.
    pub async fn check_service(
        &self,
        interface: InterfaceId,
        level: CheckLevel,
    ) -> std::result::Result<Option<HealthCheckResult>, ServiceError> {
        let runtime = self.runtime().ok_or_else(|| RegistryError::ServiceNotAvailable {
            interface: interface.to_string(),
        })?;
        runtime.channel.check_service(interface, level).await
    }

    /// Checks a service provider directly.
    pub async fn check_service_provider(
        &self,
        interface: InterfaceId,
        level: CheckLevel,
    ) -> std::result::Result<Option<HealthCheckResult>, ServiceError> {
        let runtime = self
            .runtime()
            .ok_or_else(|| RegistryError::ServiceProviderNotAvailable {
                interface: interface.to_string(),
            })?;
        let implementation = runtime.providers.entry(interface)?.implementation().clone();
        implementation.check(level).await
    }

    async fn bootstrap(&self) -> Result<Runtime> {
        let platform = self.environment.create_platform();
        let mut builder = ServiceChannel::builder()
            .platform(platform.clone())
            .principals(self.config.principals.clone())
            .application(self.config.settings.application());
        for interceptor in &self.config.interceptors {
            builder = builder.interceptor(interceptor.clone());
        }
        for listener in &self.config.listeners {
            builder = builder.listener(listener.clone());
        }
        let channel = builder.build();

        let providers = self.initialize_service_providers(platform).await?;
        let (services, components) = self.initialize_components(&channel)?;
        let activities = self.initialize_activities()?;
        Self::inject_dependencies(&services, &providers, &activities)?;

        let services = Arc::new(services);
        channel.attach(services.clone())?;

        Ok(Runtime {
            channel,
            services,
            providers,
            activities,
            components,
        })
    }

    async fn initialize_service_providers(
        &self,
        platform: Arc<dyn channel::ChannelPlatform>,
    ) -> Result<ServiceProviderRegistry> {
        let mut transaction = self.environment.bootstrap_transaction(platform);
        let scope = ExecutionScope::new();
        if let Some(context) = transaction.begin()? {
            scope.bind_transaction(context);
        }

        match scope.run(self.create_service_providers()).await {
            Ok(providers) => {
                transaction.commit()?;
                Ok(providers)
            }
            Err(e) => {
                if let Err(rollback) = transaction.rollback() {
                    tracing::warn!(error = %rollback, "Unable to roll back bootstrap transaction");
                }
                Err(e)
            }
        }
    }

    async fn create_service_providers(&self) -> Result<ServiceProviderRegistry> {
        let mut providers = ServiceProviderRegistry::new();
        for factory in &self.config.service_providers {
            let entry = factory.create_service_provider()?;
            let provider = entry.interface();
            entry.implementation().initialize().await.map_err(|source| {
                LifecycleError::ServiceProviderInitialization {
                    provider: provider.to_string(),
                    source,
                }
            })?;
            providers.register(entry)?;
            tracing::info!(
                service_provider = provider.short_name(),
                factory = factory.name(),
                "Service provider initialized"
            );
        }
        Ok(providers)
    }

    fn initialize_components(
        &self,
        channel: &ServiceChannel,
    ) -> Result<(InMemoryServiceRegistry, Vec<Arc<ComponentDescriptor>>)> {
        let mut services = InMemoryServiceRegistry::new();
        let mut components = Vec::with_capacity(self.config.components.len());
        let mut names = HashSet::new();

        for factory in &self.config.components {
            let component = Arc::new(factory.create_component());
            if !names.insert(component.name().to_string()) {
                return Err(LifecycleError::ComponentAlreadyLoaded {
                    component: component.name().to_string(),
                });
            }
            tracing::info!(
                component = component.name(),
                layer = %component.layer(),
                default_behavior = %component.default_behavior(),
                resource_unit = component.resource_unit().unwrap_or("-"),
                description = component.description().unwrap_or(""),
                "Loading component"
            );

            for service in factory.service_factories() {
                let instance = service.create_service()?;
                let proxy = service.create_proxy(channel);
                let interface = instance.interface();
                services.register(ServiceEntry::new(instance, proxy, component.clone())?)?;
                tracing::debug!(
                    component = component.name(),
                    service = interface.short_name(),
                    "Service registered"
                );
            }
            components.push(component);
        }
        Ok((services, components))
    }

    fn initialize_activities(&self) -> Result<ActivityRegistry> {
        let mut activities = ActivityRegistry::new();
        for factory in &self.config.activities {
            let entry = factory.create_activity()?;
            tracing::debug!(
                activity = entry.interface().short_name(),
                "Activity registered"
            );
            activities.register(entry)?;
        }
        Ok(activities)
    }

    fn inject_dependencies(
        services: &InMemoryServiceRegistry,
        providers: &ServiceProviderRegistry,
        activities: &ActivityRegistry,
    ) -> Result<()> {
        let injector = DependencyInjector::new(services, providers, activities);
        for entry in services.entries() {
            let owner = entry.interface().to_string();
            injector.inject(&owner, entry.implementation().as_ref())?;
        }
        for entry in providers.entries() {
            let owner = entry.interface().to_string();
            injector.inject(&owner, entry.implementation().as_ref())?;
        }
        for entry in activities.entries() {
            let owner = entry.interface().to_string();
            injector.inject(&owner, entry.implementation().as_ref())?;
        }
        Ok(())
    }

    async fn start_scheduler(&self) {
        if !self.supports_scheduling() || self.triggers.is_empty() {
            return;
        }
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_none() {
            *scheduler = Some(Scheduler::start(
                self.triggers.clone(),
                self.config.settings.trigger_interval,
            ));
        }
    }

    fn runtime(&self) -> Option<Arc<Runtime>> {
        self.read().runtime.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("environment", &self.environment.name())
            .field("state", &self.lifecycle_state())
            .field("triggers", &self.triggers.len())
            .finish()
    }
}
