//! Per-execution state of the component runtime.
//!
//! This crate provides:
//! - the transaction propagation decision table ([`decide`])
//! - invocation contexts that form the nested call stack of one execution
//! - transaction contexts with their sticky rollback-only flag and lazily
//!   opened transactional resources
//! - the [`ExecutionScope`] that binds both to the running task

pub mod error;
pub mod identity;
pub mod invocation;
pub mod scope;
pub mod sink;
pub mod transaction;
pub mod transition;

pub use error::{ContextError, Result};
pub use identity::{
    AnonymousPrincipalProvider, ApplicationInfo, ComponentRef, Principal, PrincipalProvider,
    SessionContext, StaticPrincipalProvider,
};
pub use invocation::{InvocationContext, InvocationTarget};
pub use scope::{Context, ExecutionScope};
pub use sink::{ContextTrace, TraceSink, TracingSink};
pub use transaction::{
    Resource, ResourceFactory, ResourceFactoryCache, TransactionContext, TxOutcome,
};
pub use transition::{TransactionBehavior, TransitionDecision, TxStatus, decide};
