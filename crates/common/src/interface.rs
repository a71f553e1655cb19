//! Interface identity and type-erased handles.
//!
//! Services, service providers and activities are registered under the
//! trait object type they implement (`dyn Trait`). [`InterfaceId`] is the
//! registry key and [`ErasedHandle`] stores the `Arc<dyn Trait>` so that a
//! registry can hold implementations of unrelated traits side by side.

use std::any::{Any, TypeId};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of a service, service provider or activity interface.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceId {
    type_id: TypeId,
    name: &'static str,
}

impl InterfaceId {
    /// Returns the identity of the given interface type, usually `dyn Trait`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the fully qualified type name of the interface.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the last path segment of the interface name (`Greeter`
    /// for `dyn my_app::Greeter`).
    pub fn short_name(&self) -> &'static str {
        let name = self.name.trim_start_matches("dyn ");
        name.rsplit("::").next().unwrap_or(name)
    }
}

impl PartialEq for InterfaceId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for InterfaceId {}

impl Hash for InterfaceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl std::fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A type-erased `Arc<T>` tagged with the interface it was stored under.
#[derive(Clone)]
pub struct ErasedHandle {
    interface: InterfaceId,
    value: Arc<dyn Any + Send + Sync>,
}

impl ErasedHandle {
    /// Erases the given handle. `T` is the interface, usually `dyn Trait`.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            interface: InterfaceId::of::<T>(),
            value: Arc::new(value),
        }
    }

    /// Returns the interface this handle was stored under.
    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    /// Recovers the typed handle. Returns `None` if `T` is not the
    /// interface the handle was created with.
    pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }
}

impl std::fmt::Debug for ErasedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedHandle")
            .field("interface", &self.interface.name())
            .finish()
    }
}
