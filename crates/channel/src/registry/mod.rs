//! Registries of services, service providers and activities.
//!
//! Registries are filled once during bootstrap and are read-only afterwards.
//! Every registry rejects a second registration of the same interface.

pub mod activity;
pub mod provider;
pub mod service;

pub use activity::{ActivityEntry, ActivityImplementation, ActivityRegistry};
pub use provider::{ServiceProviderEntry, ServiceProviderImplementation, ServiceProviderRegistry};
pub use service::{
    InMemoryServiceRegistry, ProxyDirectory, ServiceDirectory, ServiceDirectoryExt, ServiceEntry,
    ServiceImplementation, ServiceInstance, ServiceRegistry, ServiceRegistryExt,
};
