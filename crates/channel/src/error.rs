//! Error taxonomy of the service channel.
//!
//! Failures fall into three classes. Business failures are expected
//! outcomes of the application domain and never roll back a transaction.
//! System failures always mark the bound transaction for rollback and carry
//! a stable error code. Fatal failures (panics, context misuse) are treated
//! like system failures but are never downgraded.

use common::ErrorCode;
use context::{ContextError, TransactionBehavior, TxStatus};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the service, provider and activity registries and by
/// dependency injection.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Service {interface} is not available")]
    ServiceNotAvailable { interface: String },

    #[error("Service provider {interface} is not available")]
    ServiceProviderNotAvailable { interface: String },

    #[error("Activity {interface} is not available")]
    ActivityNotAvailable { interface: String },

    #[error("Service {interface} is already registered by component {component}")]
    ServiceAlreadyRegistered { interface: String, component: String },

    #[error("Service provider {interface} is already registered")]
    ServiceProviderAlreadyRegistered { interface: String },

    #[error("Activity {interface} is already registered")]
    ActivityAlreadyRegistered { interface: String },

    /// A handle was stored under a different interface than requested.
    #[error("Registered handle for {interface} does not implement the requested interface")]
    ServiceTypeMismatch { interface: String },

    #[error("{owner} depends on {kind} {dependency} which cannot be resolved")]
    DependencyUnresolved {
        owner: String,
        kind: &'static str,
        dependency: String,
    },

    #[error("Dependency {interface} was already injected")]
    AlreadyInjected { interface: String },

    #[error("Dependency {interface} has not been injected")]
    NotInjected { interface: String },
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::ServiceNotAvailable { .. } => ErrorCode::new(2001),
            RegistryError::ServiceProviderNotAvailable { .. } => ErrorCode::new(2002),
            RegistryError::ActivityNotAvailable { .. } => ErrorCode::new(2003),
            RegistryError::ServiceAlreadyRegistered { .. } => ErrorCode::new(2004),
            RegistryError::ServiceProviderAlreadyRegistered { .. } => ErrorCode::new(2005),
            RegistryError::ActivityAlreadyRegistered { .. } => ErrorCode::new(2006),
            RegistryError::ServiceTypeMismatch { .. } => ErrorCode::new(2007),
            RegistryError::DependencyUnresolved { .. } => ErrorCode::new(2008),
            RegistryError::AlreadyInjected { .. } => ErrorCode::new(2009),
            RegistryError::NotInjected { .. } => ErrorCode::new(2010),
        }
    }
}

/// System-level failure of a service call.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Context(#[from] ContextError),

    /// The requested propagation behaviour is not allowed in the current
    /// transaction status.
    #[error("Transaction behaviour {behavior} is not allowed with status {status}")]
    InvalidTransactionTransition {
        behavior: TransactionBehavior,
        status: TxStatus,
    },

    /// The call returned normally but its transaction was marked for
    /// rollback by a nested call or by the service itself.
    #[error("Transaction was marked for rollback during {service_method}")]
    TransactionMarkedForRollback { service_method: String },

    #[error("Channel platform failure: {reason}")]
    Platform { reason: String },

    #[error("Service channel already has a registry attached")]
    RegistryAlreadyAttached,

    /// Technical failure reported by a service implementation.
    #[error("{message}")]
    Service { code: ErrorCode, message: String },
}

impl SystemError {
    /// Creates a technical failure for a service implementation to return.
    pub fn service(code: ErrorCode, message: impl Into<String>) -> Self {
        SystemError::Service {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SystemError::Registry(e) => e.code(),
            SystemError::Context(e) => e.code(),
            SystemError::InvalidTransactionTransition { .. } => ErrorCode::new(3001),
            SystemError::TransactionMarkedForRollback { .. } => ErrorCode::new(3002),
            SystemError::Platform { .. } => ErrorCode::new(3003),
            SystemError::RegistryAlreadyAttached => ErrorCode::new(3004),
            SystemError::Service { code, .. } => *code,
        }
    }
}

/// Expected failure of the application domain.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BusinessError {
    pub code: String,
    pub message: String,
}

impl BusinessError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Error returned by every dispatched service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Business(#[from] BusinessError),

    #[error(transparent)]
    System(#[from] SystemError),

    /// The service or an interceptor panicked.
    #[error("Fatal failure in {service_method}: {message}")]
    Fatal {
        service_method: String,
        message: String,
    },
}

impl ServiceError {
    pub fn is_business(&self) -> bool {
        matches!(self, ServiceError::Business(_))
    }

    /// Returns true for failures that must never be downgraded: panics and
    /// use of contexts outside their lifetime.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::Fatal { .. }
                | ServiceError::System(SystemError::Context(
                    ContextError::InvocationContextInvalidated { .. }
                        | ContextError::TransactionContextInvalidated { .. }
                        | ContextError::NotCurrent { .. }
                ))
        )
    }

    /// Returns the failure class used in logs and metrics.
    pub fn class(&self) -> &'static str {
        if self.is_business() {
            "business"
        } else if self.is_fatal() {
            "fatal"
        } else {
            "system"
        }
    }

    /// Returns the error code of system and fatal failures.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ServiceError::Business(_) => None,
            ServiceError::System(e) => Some(e.code()),
            ServiceError::Fatal { .. } => Some(ErrorCode::new(3900)),
        }
    }
}

impl From<RegistryError> for ServiceError {
    fn from(e: RegistryError) -> Self {
        ServiceError::System(SystemError::Registry(e))
    }
}

impl From<ContextError> for ServiceError {
    fn from(e: ContextError) -> Self {
        ServiceError::System(SystemError::Context(e))
    }
}

#[cfg(test)]
mod tests {
    use common::ContextId;

    use super::*;

    #[test]
    fn test_classification() {
        let business: ServiceError = BusinessError::new("ORDER-1", "out of stock").into();
        assert!(business.is_business());
        assert_eq!(business.class(), "business");
        assert!(business.code().is_none());

        let system: ServiceError = RegistryError::ServiceNotAvailable {
            interface: "dyn Billing".to_string(),
        }
        .into();
        assert_eq!(system.class(), "system");
        assert_eq!(system.code(), Some(ErrorCode::new(2001)));

        let misuse: ServiceError = ContextError::InvocationContextInvalidated {
            context_id: ContextId::new(),
        }
        .into();
        assert!(misuse.is_fatal());
    }

    #[test]
    fn test_invalid_transition_names_behavior_and_status() {
        let error = SystemError::InvalidTransactionTransition {
            behavior: TransactionBehavior::Mandatory,
            status: TxStatus::None,
        };
        let message = error.to_string();
        assert!(message.contains("Mandatory"));
        assert!(message.contains("NoTransaction"));
        assert_eq!(error.code().to_string(), "RT-3001");
    }
}
