use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ErasedHandle, InterfaceId};

use crate::error::{RegistryError, ServiceError};
use crate::health::{CheckLevel, HealthCheckResult};
use crate::injection::Injectable;

/// Runtime facet of a service provider.
///
/// Service providers are infrastructure objects (connection pools, clients
/// of external systems) used by services directly, without the dispatcher.
#[async_trait]
pub trait ServiceProviderImplementation: Injectable {
    /// Prepares the provider. Runs once during bootstrap, inside the
    /// bootstrap transaction.
    async fn initialize(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn check(&self, _level: CheckLevel) -> Result<Option<HealthCheckResult>, ServiceError> {
        Ok(None)
    }
}

#[derive(Clone)]
pub struct ServiceProviderEntry {
    handle: ErasedHandle,
    implementation: Arc<dyn ServiceProviderImplementation>,
}

impl ServiceProviderEntry {
    /// Wraps a provider implementing interface `T`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(
        typed: Arc<T>,
        implementation: Arc<dyn ServiceProviderImplementation>,
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

    pub fn implementation(&self) -> &Arc<dyn ServiceProviderImplementation> {
        &self.implementation
    }
}

impl std::fmt::Debug for ServiceProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceProviderEntry")
            .field("interface", &self.interface().name())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ServiceProviderRegistry {
    entries: Vec<ServiceProviderEntry>,
    index: HashMap<InterfaceId, usize>,
}

impl ServiceProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ServiceProviderEntry) -> Result<(), RegistryError> {
        let interface = entry.interface();
        if self.index.contains_key(&interface) {
            return Err(RegistryError::ServiceProviderAlreadyRegistered {
                interface: interface.to_string(),
            });
        }
        self.index.insert(interface, self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn entry(&self, interface: InterfaceId) -> Result<&ServiceProviderEntry, RegistryError> {
        self.index
            .get(&interface)
            .map(|i| &self.entries[*i])
            .ok_or_else(|| RegistryError::ServiceProviderNotAvailable {
                interface: interface.to_string(),
            })
    }

    pub fn handle(&self, interface: InterfaceId) -> Result<ErasedHandle, RegistryError> {
        Ok(self.entry(interface)?.handle().clone())
    }

    /// Returns the provider implementing interface `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.entry(InterfaceId::of::<T>())?
            .handle()
            .downcast::<T>()
            .ok_or_else(|| RegistryError::ServiceTypeMismatch {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }

    /// Returns every provider in registration order.
    pub fn entries(&self) -> &[ServiceProviderEntry] {
        &self.entries
    }

    pub fn interfaces(&self) -> Vec<InterfaceId> {
        self.entries.iter().map(ServiceProviderEntry::interface).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Mailer: Send + Sync {
        fn outbox(&self) -> usize;
    }

    struct SmtpMailer;

    impl Mailer for SmtpMailer {
        fn outbox(&self) -> usize {
            3
        }
    }

    impl Injectable for SmtpMailer {}

    impl ServiceProviderImplementation for SmtpMailer {}

    fn mailer() -> ServiceProviderEntry {
        let provider = Arc::new(SmtpMailer);
        ServiceProviderEntry::new::<dyn Mailer>(provider.clone(), provider)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ServiceProviderRegistry::new();
        registry.register(mailer()).unwrap();

        assert_eq!(registry.get::<dyn Mailer>().unwrap().outbox(), 3);
        assert_eq!(registry.interfaces(), vec![InterfaceId::of::<dyn Mailer>()]);
    }

    #[test]
    fn test_duplicate_provider_is_rejected() {
        let mut registry = ServiceProviderRegistry::new();
        registry.register(mailer()).unwrap();

        assert!(matches!(
            registry.register(mailer()),
            Err(RegistryError::ServiceProviderAlreadyRegistered { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_provider() {
        let registry = ServiceProviderRegistry::new();
        assert!(matches!(
            registry.get::<dyn Mailer>(),
            Err(RegistryError::ServiceProviderNotAvailable { .. })
        ));
    }
}
