use std::collections::HashMap;
use std::sync::Arc;

use common::{ErasedHandle, InterfaceId};

use crate::error::RegistryError;
use crate::injection::Injectable;

/// Runtime facet of an activity: a unit of client-side work that uses
/// services but is not itself dispatched.
pub trait ActivityImplementation: Injectable {}

#[derive(Clone)]
pub struct ActivityEntry {
    handle: ErasedHandle,
    implementation: Arc<dyn ActivityImplementation>,
}

impl ActivityEntry {
    pub fn new<T: ?Sized + Send + Sync + 'static>(
        typed: Arc<T>,
        implementation: Arc<dyn ActivityImplementation>,
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

    pub fn implementation(&self) -> &Arc<dyn ActivityImplementation> {
        &self.implementation
    }
}

#[derive(Clone, Default)]
pub struct ActivityRegistry {
    entries: HashMap<InterfaceId, ActivityEntry>,
}

impl ActivityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ActivityEntry) -> Result<(), RegistryError> {
        let interface = entry.interface();
        if self.entries.contains_key(&interface) {
            return Err(RegistryError::ActivityAlreadyRegistered {
                interface: interface.to_string(),
            });
        }
        self.entries.insert(interface, entry);
        Ok(())
    }

    pub fn handle(&self, interface: InterfaceId) -> Result<ErasedHandle, RegistryError> {
        self.entries
            .get(&interface)
            .map(|e| e.handle().clone())
            .ok_or_else(|| RegistryError::ActivityNotAvailable {
                interface: interface.to_string(),
            })
    }

    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, RegistryError> {
        self.handle(InterfaceId::of::<T>())?
            .downcast::<T>()
            .ok_or_else(|| RegistryError::ServiceTypeMismatch {
                interface: InterfaceId::of::<T>().to_string(),
            })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.values()
    }

    pub fn interfaces(&self) -> Vec<InterfaceId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
