//! Factories the runtime uses to create its objects during bootstrap.
//!
//! A factory is the only place that knows concrete types. The lifecycle
//! manager sees service providers, components, services and activities
//! through the erased entries of the channel registries.

use std::sync::Arc;

use channel::{
    ActivityEntry, ComponentDescriptor, ServiceChannel, ServiceInstance, ServiceProviderEntry,
};
use common::ErasedHandle;

use crate::error::Result;

/// Creates one service provider.
pub trait ServiceProviderFactory: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_service_provider(&self) -> Result<ServiceProviderEntry>;
}

/// Creates one component and knows the factories of its services.
pub trait ComponentFactory: Send + Sync {
    fn create_component(&self) -> ComponentDescriptor;

    fn service_factories(&self) -> Vec<Arc<dyn ServiceFactory>>;
}

/// Creates the implementation and the proxy of one service.
pub trait ServiceFactory: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_service(&self) -> Result<ServiceInstance>;

    /// Creates the proxy clients use. The proxy forwards every method
    /// through `channel`.
    fn create_proxy(&self, channel: &ServiceChannel) -> ErasedHandle;
}

/// Creates one activity.
pub trait ActivityFactory: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn create_activity(&self) -> Result<ActivityEntry>;
}

/// A component factory assembled from a descriptor and service factories.
#[derive(Clone)]
pub struct StaticComponentFactory {
    descriptor: ComponentDescriptor,
    services: Vec<Arc<dyn ServiceFactory>>,
}

impl StaticComponentFactory {
    pub fn new(descriptor: ComponentDescriptor) -> Self {
        Self {
            descriptor,
            services: Vec::new(),
        }
    }

    pub fn with_service(mut self, factory: Arc<dyn ServiceFactory>) -> Self {
        self.services.push(factory);
        self
    }
}

impl ComponentFactory for StaticComponentFactory {
    fn create_component(&self) -> ComponentDescriptor {
        self.descriptor.clone()
    }

    fn service_factories(&self) -> Vec<Arc<dyn ServiceFactory>> {
        self.services.clone()
    }
}
