use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ErasedHandle, InterfaceId};

use crate::component::ComponentDescriptor;
use crate::error::{RegistryError, ServiceError};
use crate::health::{CheckLevel, HealthCheckResult};
use crate::injection::Injectable;

/// Runtime facet of a service implementation: dependency injection and
/// health checks.
#[async_trait]
pub trait ServiceImplementation: Injectable {
    /// Checks the health of the service. `None` means the service does not
    /// implement a check.
    async fn check(&self, _level: CheckLevel) -> Result<Option<HealthCheckResult>, ServiceError> {
        Ok(None)
    }
}

/// A service implementation together with its typed interface handle.
#[derive(Clone)]
pub struct ServiceInstance {
    handle: ErasedHandle,
    implementation: Arc<dyn ServiceImplementation>,
}

impl ServiceInstance {
    /// Wraps an implementation of the service interface `T`.
    ///
    /// `typed` and `implementation` are usually the same object:
    /// `ServiceInstance::new::<dyn Greeter>(service.clone(), service)`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(
        typed: Arc<T>,
        implementation: Arc<dyn ServiceImplementation>,
    ) -> Self {
        Self {
            handle: ErasedHandle::new(typed),
            implementation,
        }
    }

    pub fn interface(&self) -> InterfaceId {
        self.handle.interface()
    }

    pub fn handle(&self) -> &ErasedHandle {
        &self.handle
    }

    pub fn implementation(&self) -> &Arc<dyn ServiceImplementation> {
        &self.implementation
    }
}

/// Everything the channel knows about one registered service.
#[derive(Clone)]
pub struct ServiceEntry {
    instance: ServiceInstance,
    proxy: ErasedHandle,
    component: Arc<ComponentDescriptor>,
}

impl ServiceEntry {
    /// Creates an entry. The proxy must implement the same interface as the
    /// instance.
    pub fn new(
        instance: ServiceInstance,
        proxy: ErasedHandle,
        component: Arc<ComponentDescriptor>,
    ) -> Result<Self, RegistryError> {
        if proxy.interface() != instance.interface() {
            return Err(RegistryError::ServiceTypeMismatch {
                interface: instance.interface().to_string(),
            });
        }
        Ok(Self {
            instance,
            proxy,
            component,
        })
    }

    pub fn interface(&self) -> InterfaceId {
        self.instance.interface()
    }

    pub fn instance(&self) -> &ErasedHandle {
        self.instance.handle()
    }

    pub fn implementation(&self) -> &Arc<dyn ServiceImplementation> {
        self.instance.implementation()
    }

    pub fn proxy(&self) -> &ErasedHandle {
        &self.proxy
    }

    pub fn component(&self) -> &Arc<ComponentDescriptor> {
        &self.component
    }
}

impl std::fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("interface", &self.interface().name())
            .field("component", &self.component.name())
            .finish()
    }
}

/// Read-only lookup of service proxies.
///
/// This is all a remote client gets: it can call services but never reach
/// their implementations.
pub trait ServiceDirectory: Send + Sync {
    /// Returns the proxy registered for `interface`.
    fn proxy(&self, interface: InterfaceId) -> Result<ErasedHandle, RegistryError>;

    /// Returns every registered interface.
    fn interfaces(&self) -> Vec<InterfaceId>;

    fn contains(&self, interface: InterfaceId) -> bool {
        self.proxy(interface).is_ok()
    }
}

/// Full lookup of service instances, proxies and their components.
pub trait ServiceRegistry: ServiceDirectory {
    fn entry(&self, interface: InterfaceId) -> Result<ServiceEntry, RegistryError>;

    /// Returns every entry in registration order.
    fn entries(&self) -> Vec<ServiceEntry>;
}

/// Typed lookups on a [`ServiceDirectory`].
pub trait ServiceDirectoryExt: ServiceDirectory {
    /// Returns the proxy of service interface `T`.
    fn proxy_of<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.proxy(InterfaceId::of::<T>())?
            .downcast::<T>()
            .ok_or_else(|| RegistryError::ServiceTypeMismatch {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }
}

impl<D: ServiceDirectory + ?Sized> ServiceDirectoryExt for D {}

/// Typed lookups on a [`ServiceRegistry`].
pub trait ServiceRegistryExt: ServiceRegistry {
    /// Returns the implementation of service interface `T`, bypassing the
    /// dispatcher.
    fn instance_of<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.entry(InterfaceId::of::<T>())?
            .instance()
            .downcast::<T>()
            .ok_or_else(|| RegistryError::ServiceTypeMismatch {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }
}

impl<R: ServiceRegistry + ?Sized> ServiceRegistryExt for R {}

/// Service registry held in memory.
#[derive(Clone, Default)]
pub struct InMemoryServiceRegistry {
    entries: Vec<ServiceEntry>,
    index: HashMap<InterfaceId, usize>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service. Fails if the interface is already registered.
    pub fn register(&mut self, entry: ServiceEntry) -> Result<(), RegistryError> {
        let interface = entry.interface();
        if let Some(existing) = self.index.get(&interface) {
            return Err(RegistryError::ServiceAlreadyRegistered {
                interface: interface.to_string(),
                component: self.entries[*existing].component().name().to_string(),
            });
        }
        self.index.insert(interface, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ServiceDirectory for InMemoryServiceRegistry {
    fn proxy(&self, interface: InterfaceId) -> Result<ErasedHandle, RegistryError> {
        Ok(self.entry(interface)?.proxy().clone())
    }

    fn interfaces(&self) -> Vec<InterfaceId> {
        self.entries.iter().map(ServiceEntry::interface).collect()
    }

    fn contains(&self, interface: InterfaceId) -> bool {
        self.index.contains_key(&interface)
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn entry(&self, interface: InterfaceId) -> Result<ServiceEntry, RegistryError> {
        self.index
            .get(&interface)
            .map(|i| self.entries[*i].clone())
            .ok_or_else(|| RegistryError::ServiceNotAvailable {
                interface: interface.to_string(),
            })
    }

    fn entries(&self) -> Vec<ServiceEntry> {
        self.entries.clone()
    }
}

/// Directory of proxies only, used by clients that reach the services
/// through a remote channel.
#[derive(Clone, Default)]
pub struct ProxyDirectory {
    proxies: HashMap<InterfaceId, ErasedHandle>,
}

impl ProxyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a proxy under the interface it was erased with.
    pub fn register(&mut self, proxy: ErasedHandle) -> Result<(), RegistryError> {
        let interface = proxy.interface();
        if self.proxies.contains_key(&interface) {
            return Err(RegistryError::ServiceAlreadyRegistered {
                interface: interface.to_string(),
                component: "proxy".to_string(),
            });
        }
        self.proxies.insert(interface, proxy);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl ServiceDirectory for ProxyDirectory {
    fn proxy(&self, interface: InterfaceId) -> Result<ErasedHandle, RegistryError> {
        self.proxies
            .get(&interface)
            .cloned()
            .ok_or_else(|| RegistryError::ServiceNotAvailable {
                interface: interface.to_string(),
            })
    }

    fn interfaces(&self) -> Vec<InterfaceId> {
        self.proxies.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    trait Clock: Send + Sync {}

    struct Impl(&'static str);

    impl Greeter for Impl {
        fn greet(&self) -> String {
            self.0.to_string()
        }
    }

    impl Injectable for Impl {}

    impl ServiceImplementation for Impl {}

    fn entry(component: &str) -> ServiceEntry {
        let service = Arc::new(Impl("instance"));
        let proxy: Arc<dyn Greeter> = Arc::new(Impl("proxy"));
        ServiceEntry::new(
            ServiceInstance::new::<dyn Greeter>(service.clone(), service),
            ErasedHandle::new(proxy),
            Arc::new(ComponentDescriptor::new(component)),
        )
        .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = InMemoryServiceRegistry::new();
        registry.register(entry("Greeting")).unwrap();

        assert_eq!(registry.instance_of::<dyn Greeter>().unwrap().greet(), "instance");
        assert_eq!(registry.proxy_of::<dyn Greeter>().unwrap().greet(), "proxy");
        assert_eq!(registry.interfaces(), vec![InterfaceId::of::<dyn Greeter>()]);
        assert!(registry.contains(InterfaceId::of::<dyn Greeter>()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = InMemoryServiceRegistry::new();
        registry.register(entry("Greeting")).unwrap();

        let result = registry.register(entry("Other"));

        match result {
            Err(RegistryError::ServiceAlreadyRegistered { component, .. }) => {
                assert_eq!(component, "Greeting")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_service() {
        let registry = InMemoryServiceRegistry::new();
        assert!(matches!(
            registry.entry(InterfaceId::of::<dyn Clock>()),
            Err(RegistryError::ServiceNotAvailable { .. })
        ));
        assert!(registry.proxy_of::<dyn Clock>().is_err());
    }

    #[test]
    fn test_proxy_must_match_instance_interface() {
        struct Tick;
        impl Clock for Tick {}

        let service = Arc::new(Impl("instance"));
        let proxy: Arc<dyn Clock> = Arc::new(Tick);
        let result = ServiceEntry::new(
            ServiceInstance::new::<dyn Greeter>(service.clone(), service),
            ErasedHandle::new(proxy),
            Arc::new(ComponentDescriptor::new("Greeting")),
        );

        assert!(matches!(result, Err(RegistryError::ServiceTypeMismatch { .. })));
    }

    #[test]
    fn test_proxy_directory_serves_proxies_only() {
        let proxy: Arc<dyn Greeter> = Arc::new(Impl("remote"));
        let mut directory = ProxyDirectory::new();
        directory.register(ErasedHandle::new(proxy.clone())).unwrap();

        assert_eq!(directory.proxy_of::<dyn Greeter>().unwrap().greet(), "remote");
        assert!(directory.register(ErasedHandle::new(proxy)).is_err());
        assert!(!directory.contains(InterfaceId::of::<dyn Clock>()));
    }
}
