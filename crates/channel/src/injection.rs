//! Explicit dependency injection.
//!
//! Every service, service provider and activity declares the interfaces it
//! depends on through [`Injectable::dependencies`]. During bootstrap the
//! [`DependencyInjector`] resolves every declaration by exact interface match
//! and hands the results to [`Injectable::inject`], which usually stores them
//! in [`Injected`] slots. Service dependencies resolve to the service proxy so
//! that calls between services go through the dispatcher.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use common::{ErasedHandle, InterfaceId};

use crate::error::RegistryError;
use crate::registry::{ActivityRegistry, ServiceDirectory, ServiceProviderRegistry};

/// What kind of registered object a dependency refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    Service,
    ServiceProvider,
    Activity,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Service => "service",
            DependencyKind::ServiceProvider => "service provider",
            DependencyKind::Activity => "activity",
        }
    }
}

/// A declared dependency on an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub interface: InterfaceId,
}

impl Dependency {
    pub fn service<T: ?Sized + 'static>() -> Self {
        Self {
            kind: DependencyKind::Service,
            interface: InterfaceId::of::<T>(),
        }
    }

    pub fn service_provider<T: ?Sized + 'static>() -> Self {
        Self {
            kind: DependencyKind::ServiceProvider,
            interface: InterfaceId::of::<T>(),
        }
    }

    pub fn activity<T: ?Sized + 'static>() -> Self {
        Self {
            kind: DependencyKind::Activity,
            interface: InterfaceId::of::<T>(),
        }
    }
}

/// Implemented by everything that can receive dependencies.
pub trait Injectable: Send + Sync {
    /// Declares the dependencies to resolve.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Receives the resolved dependencies. Called exactly once.
    fn inject(&self, _resolved: &ResolvedDependencies) -> Result<(), RegistryError> {
        Ok(())
    }
}

/// The handles resolved for one injectable.
#[derive(Clone, Default)]
pub struct ResolvedDependencies {
    handles: HashMap<Dependency, ErasedHandle>,
}

impl ResolvedDependencies {
    fn get<T: ?Sized + Send + Sync + 'static>(
        &self,
        dependency: Dependency,
    ) -> Result<Arc<T>, RegistryError> {
        let handle = self
            .handles
            .get(&dependency)
            .ok_or_else(|| RegistryError::NotInjected {
                interface: dependency.interface.to_string(),
            })?;
        handle
            .downcast::<T>()
            .ok_or_else(|| RegistryError::ServiceTypeMismatch {
                interface: dependency.interface.to_string(),
            })
    }

    /// Returns the proxy of the declared service dependency `T`.
    pub fn service<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.get(Dependency::service::<T>())
    }

    pub fn service_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>, RegistryError> {
        self.get(Dependency::service_provider::<T>())
    }

    pub fn activity<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.get(Dependency::activity::<T>())
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// A write-once slot for an injected dependency.
pub struct Injected<T: ?Sized> {
    slot: OnceLock<Arc<T>>,
}

impl<T: ?Sized + 'static> Injected<T> {
    pub fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Stores the dependency. Fails if the slot is already filled.
    pub fn set(&self, value: Arc<T>) -> Result<(), RegistryError> {
        self.slot
            .set(value)
            .map_err(|_| RegistryError::AlreadyInjected {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }

    /// Returns the dependency. Fails if injection has not happened yet.
    pub fn get(&self) -> Result<Arc<T>, RegistryError> {
        self.slot
            .get()
            .cloned()
            .ok_or_else(|| RegistryError::NotInjected {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl<T: ?Sized + 'static> Default for Injected<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized + 'static> std::fmt::Debug for Injected<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Injected")
            .field("interface", &InterfaceId::of::<T>().name())
            .field("set", &self.is_set())
            .finish()
    }
}

/// Resolves declared dependencies against the registries.
pub struct DependencyInjector<'a> {
    services: &'a dyn ServiceDirectory,
    providers: &'a ServiceProviderRegistry,
    activities: &'a ActivityRegistry,
}

impl<'a> DependencyInjector<'a> {
    pub fn new(
        services: &'a dyn ServiceDirectory,
        providers: &'a ServiceProviderRegistry,
        activities: &'a ActivityRegistry,
    ) -> Self {
        Self {
            services,
            providers,
            activities,
        }
    }

    /// Resolves every dependency or fails on the first missing one.
    pub fn resolve(
        &self,
        owner: &str,
        dependencies: &[Dependency],
    ) -> Result<ResolvedDependencies, RegistryError> {
        let mut handles = HashMap::with_capacity(dependencies.len());
        for dependency in dependencies {
            let handle = match dependency.kind {
                DependencyKind::Service => self.services.proxy(dependency.interface),
                DependencyKind::ServiceProvider => self.providers.handle(dependency.interface),
                DependencyKind::Activity => self.activities.handle(dependency.interface),
            }
            .map_err(|_| RegistryError::DependencyUnresolved {
                owner: owner.to_string(),
                kind: dependency.kind.as_str(),
                dependency: dependency.interface.to_string(),
            })?;
            handles.insert(*dependency, handle);
        }
        Ok(ResolvedDependencies { handles })
    }

    /// Resolves and injects the dependencies of `target`. Returns the number
    /// of injected dependencies.
    pub fn inject<T: Injectable + ?Sized>(
        &self,
        owner: &str,
        target: &T,
    ) -> Result<usize, RegistryError> {
        let dependencies = target.dependencies();
        if dependencies.is_empty() {
            return Ok(0);
        }
        let resolved = self.resolve(owner, &dependencies)?;
        target.inject(&resolved)?;
        tracing::debug!(owner, dependencies = resolved.len(), "Injected dependencies");
        Ok(resolved.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDescriptor;
    use crate::registry::{
        InMemoryServiceRegistry, ServiceEntry, ServiceImplementation, ServiceInstance,
        ServiceProviderEntry, ServiceProviderImplementation,
    };

    trait Repository: Send + Sync {
        fn label(&self) -> &'static str;
    }

    trait Pool: Send + Sync {}

    struct RepositoryImpl(&'static str);

    impl Repository for RepositoryImpl {
        fn label(&self) -> &'static str {
            self.0
        }
    }

    impl Injectable for RepositoryImpl {}
    impl ServiceImplementation for RepositoryImpl {}

    struct PoolImpl;

    impl Pool for PoolImpl {}
    impl Injectable for PoolImpl {}
    impl ServiceProviderImplementation for PoolImpl {}

    #[derive(Default)]
    struct Consumer {
        repository: Injected<dyn Repository>,
        pool: Injected<dyn Pool>,
    }

    impl Injectable for Consumer {
        fn dependencies(&self) -> Vec<Dependency> {
            vec![
                Dependency::service::<dyn Repository>(),
                Dependency::service_provider::<dyn Pool>(),
            ]
        }

        fn inject(&self, resolved: &ResolvedDependencies) -> Result<(), RegistryError> {
            self.repository.set(resolved.service::<dyn Repository>()?)?;
            self.pool.set(resolved.service_provider::<dyn Pool>()?)?;
            Ok(())
        }
    }

    fn registries() -> (InMemoryServiceRegistry, ServiceProviderRegistry) {
        let instance = Arc::new(RepositoryImpl("instance"));
        let proxy: Arc<dyn Repository> = Arc::new(RepositoryImpl("proxy"));
        let mut services = InMemoryServiceRegistry::new();
        services
            .register(
                ServiceEntry::new(
                    ServiceInstance::new::<dyn Repository>(instance.clone(), instance),
                    ErasedHandle::new(proxy),
                    Arc::new(ComponentDescriptor::new("Storage")),
                )
                .unwrap(),
            )
            .unwrap();

        let pool = Arc::new(PoolImpl);
        let mut providers = ServiceProviderRegistry::new();
        providers
            .register(ServiceProviderEntry::new::<dyn Pool>(pool.clone(), pool))
            .unwrap();
        (services, providers)
    }

    #[test]
    fn test_services_receive_proxies() {
        let (services, providers) = registries();
        let activities = ActivityRegistry::new();
        let injector = DependencyInjector::new(&services, &providers, &activities);
        let consumer = Consumer::default();

        let injected = injector.inject("Consumer", &consumer).unwrap();

        assert_eq!(injected, 2);
        assert_eq!(consumer.repository.get().unwrap().label(), "proxy");
        assert!(consumer.pool.is_set());
    }

    #[test]
    fn test_unresolved_dependency_fails_fast() {
        let services = InMemoryServiceRegistry::new();
        let (_, providers) = registries();
        let activities = ActivityRegistry::new();
        let injector = DependencyInjector::new(&services, &providers, &activities);
        let consumer = Consumer::default();

        let result = injector.inject("Consumer", &consumer);

        match result {
            Err(RegistryError::DependencyUnresolved { owner, kind, .. }) => {
                assert_eq!(owner, "Consumer");
                assert_eq!(kind, "service");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!consumer.repository.is_set());
        assert!(!consumer.pool.is_set());
    }

    #[test]
    fn test_injected_slot_is_write_once() {
        let slot: Injected<dyn Repository> = Injected::new();
        assert!(matches!(slot.get(), Err(RegistryError::NotInjected { .. })));

        slot.set(Arc::new(RepositoryImpl("first"))).unwrap();
        let second = slot.set(Arc::new(RepositoryImpl("second")));

        assert!(matches!(second, Err(RegistryError::AlreadyInjected { .. })));
        assert_eq!(slot.get().unwrap().label(), "first");
    }
}
