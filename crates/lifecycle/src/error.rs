//! Lifecycle error types.

use channel::{RegistryError, ServiceError, SystemError};
use common::ErrorCode;
use thiserror::Error;

use crate::state::LifecycleState;

/// Errors raised while bootstrapping or shutting down a runtime.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Two component factories produced components with the same name.
    #[error("Component {component} is already loaded")]
    ComponentAlreadyLoaded { component: String },

    #[error("Initialization of service provider {provider} failed: {source}")]
    ServiceProviderInitialization {
        provider: String,
        source: ServiceError,
    },

    #[error("Bootstrap transaction could not {action}: {reason}")]
    BootstrapTransaction { action: &'static str, reason: String },

    #[error("Cannot {operation} a runtime in state {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Environment shutdown failed: {reason}")]
    Shutdown { reason: String },

    /// A factory could not create its product.
    #[error("Factory {factory} failed: {reason}")]
    Factory { factory: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Channel(#[from] SystemError),
}

impl LifecycleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LifecycleError::ComponentAlreadyLoaded { .. } => ErrorCode::new(4001),
            LifecycleError::ServiceProviderInitialization { .. } => ErrorCode::new(4002),
            LifecycleError::BootstrapTransaction { .. } => ErrorCode::new(4003),
            LifecycleError::InvalidState { .. } => ErrorCode::new(4004),
            LifecycleError::Shutdown { .. } => ErrorCode::new(4005),
            LifecycleError::Factory { .. } => ErrorCode::new(4006),
            LifecycleError::Registry(e) => e.code(),
            LifecycleError::Channel(e) => e.code(),
        }
    }

    /// Convenience constructor for factory failures.
    pub fn factory(factory: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        LifecycleError::Factory {
            factory: factory.into(),
            reason: reason.to_string(),
        }
    }
}

/// Convenience type alias for lifecycle results.
pub type Result<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = LifecycleError::ComponentAlreadyLoaded {
            component: "billing".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::new(4001));
        assert_eq!(err.to_string(), "Component billing is already loaded");

        let err = LifecycleError::InvalidState {
            operation: "shut down",
            state: LifecycleState::NotInitialized,
        };
        assert_eq!(err.code(), ErrorCode::new(4004));
        assert_eq!(
            err.to_string(),
            "Cannot shut down a runtime in state NotInitialized"
        );
    }

    #[test]
    fn test_registry_errors_keep_their_code() {
        let err: LifecycleError = RegistryError::ServiceNotAvailable {
            interface: "Billing".to_string(),
        }
        .into();
        assert_eq!(err.code(), ErrorCode::new(2001));
    }
}
