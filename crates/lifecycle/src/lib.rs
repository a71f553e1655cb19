//! Lifecycle of the component runtime.
//!
//! A [`LifecycleManager`] bootstraps a runtime from a [`RuntimeConfig`]:
//! it creates service providers, components with their services, and
//! activities through their factories, injects dependencies and attaches
//! the registry to a [`channel::ServiceChannel`]. The hosting
//! [`Environment`] supplies the channel platform and the bootstrap
//! transaction.

pub mod config;
pub mod environment;
pub mod error;
pub mod factory;
pub mod manager;
pub mod state;
pub mod trigger;

pub use config::{RuntimeConfig, RuntimeConfigBuilder, RuntimeSettings};
pub use environment::{
    BootstrapStatus, BootstrapTransaction, ContainerEnvironment, Environment, LocalEnvironment,
    PlatformBootstrapTransaction,
};
pub use error::{LifecycleError, Result};
pub use factory::{
    ActivityFactory, ComponentFactory, ServiceFactory, ServiceProviderFactory,
    StaticComponentFactory,
};
pub use manager::LifecycleManager;
pub use state::LifecycleState;
pub use trigger::Trigger;
