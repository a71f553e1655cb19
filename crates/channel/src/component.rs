//! Component descriptors.

use std::sync::Arc;

use common::ComponentId;
use context::{ComponentRef, TransactionBehavior};
use serde::{Deserialize, Serialize};

use crate::interceptor::ServiceChannelInterceptor;

/// Architectural layer a component belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Presentation,
    #[default]
    Business,
    Integration,
    Infrastructure,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Presentation => "presentation",
            Layer::Business => "business",
            Layer::Integration => "integration",
            Layer::Infrastructure => "infrastructure",
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Describes a component: a named group of services that share
/// interceptors, a default transaction behaviour and a resource unit.
#[derive(Clone)]
pub struct ComponentDescriptor {
    reference: ComponentRef,
    description: Option<String>,
    layer: Layer,
    default_behavior: TransactionBehavior,
    interceptors: Vec<Arc<dyn ServiceChannelInterceptor>>,
}

impl ComponentDescriptor {
    /// Creates a business layer component whose services default to
    /// `Required`.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            reference: ComponentRef::new(ComponentId::new(), name),
            description: None,
            layer: Layer::default(),
            default_behavior: TransactionBehavior::Required,
            interceptors: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_default_behavior(mut self, behavior: TransactionBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    pub fn with_resource_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.reference = self.reference.with_resource_unit(unit);
        self
    }

    /// Adds an interceptor that only sees calls to this component's services.
    pub fn with_interceptor(mut self, interceptor: Arc<dyn ServiceChannelInterceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn id(&self) -> ComponentId {
        self.reference.id()
    }

    pub fn name(&self) -> &str {
        self.reference.name()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn default_behavior(&self) -> TransactionBehavior {
        self.default_behavior
    }

    pub fn resource_unit(&self) -> Option<&str> {
        self.reference.resource_unit()
    }

    pub fn interceptors(&self) -> &[Arc<dyn ServiceChannelInterceptor>] {
        &self.interceptors
    }

    /// Returns the identity carried by invocation contexts.
    pub fn reference(&self) -> &ComponentRef {
        &self.reference
    }
}

impl std::fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("layer", &self.layer)
            .field("default_behavior", &self.default_behavior)
            .field("resource_unit", &self.resource_unit())
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}
