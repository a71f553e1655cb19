use common::{ContextId, ErrorCode, TransactionId};
use thiserror::Error;

/// Errors raised by invocation and transaction contexts.
#[derive(Debug, Error)]
pub enum ContextError {
    /// An invocation context was read or written after it was popped.
    #[error("Invocation context {context_id} used after it was invalidated")]
    InvocationContextInvalidated { context_id: ContextId },

    /// A transaction context was used after its transaction completed.
    #[error("Transaction context {transaction_id} used after it was invalidated")]
    TransactionContextInvalidated { transaction_id: TransactionId },

    /// A context was popped or pushed out of LIFO order.
    #[error("Invocation context {context_id} is not the current context (current: {current})")]
    NotCurrent { context_id: ContextId, current: String },

    /// A resource was requested outside of a transaction.
    #[error("No transaction context is bound to the current execution")]
    NoTransaction,

    /// A resource was requested outside of a service call.
    #[error("No invocation context is active for the current execution")]
    NoInvocationContext,

    /// The calling component declares no resource unit.
    #[error("Component {component} has no resource unit configured")]
    NoResourceUnit { component: String },

    /// A resource could not be opened.
    #[error("Resource unit '{unit}' unavailable: {reason}")]
    ResourceUnavailable { unit: String, reason: String },

    /// A resource failed to commit or roll back.
    #[error("Resource unit '{unit}' failed to {action}: {reason}")]
    ResourceCompletion {
        unit: String,
        action: &'static str,
        reason: String,
    },
}

impl ContextError {
    /// Returns the stable error code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            ContextError::InvocationContextInvalidated { .. } => ErrorCode::new(1001),
            ContextError::TransactionContextInvalidated { .. } => ErrorCode::new(1002),
            ContextError::NotCurrent { .. } => ErrorCode::new(1003),
            ContextError::NoTransaction => ErrorCode::new(1004),
            ContextError::NoInvocationContext => ErrorCode::new(1005),
            ContextError::NoResourceUnit { .. } => ErrorCode::new(1006),
            ContextError::ResourceUnavailable { .. } => ErrorCode::new(1007),
            ContextError::ResourceCompletion { .. } => ErrorCode::new(1008),
        }
    }
}

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
