//! Platform extension points of the dispatcher.
//!
//! A platform decides how invocation contexts are created and how
//! transactions are bound to resources and completed.

use std::sync::Arc;

use context::{
    ExecutionScope, InvocationContext, InvocationTarget, PrincipalProvider, ResourceFactoryCache,
    TransactionContext,
};

use crate::error::SystemError;

pub trait ChannelPlatform: Send + Sync {
    fn name(&self) -> &'static str;

    /// Creates and pushes the invocation context of a call. The context is a
    /// root if none is current, otherwise a child of the current one.
    fn create_invocation_context(
        &self,
        scope: &ExecutionScope,
        target: InvocationTarget,
        principals: &dyn PrincipalProvider,
    ) -> InvocationContext {
        scope.push(target, principals)
    }

    /// Creates the context of a new transaction.
    fn create_transaction_context(&self) -> Result<Arc<TransactionContext>, SystemError>;

    /// Called right before a transaction completes. Its rollback flag tells
    /// whether it commits or rolls back.
    fn release_transaction_context(&self, transaction: &TransactionContext)
    -> Result<(), SystemError>;
}

/// In-process platform. Transactions open resources from a shared factory
/// cache and complete them on release.
#[derive(Debug, Clone)]
pub struct LocalPlatform {
    factories: ResourceFactoryCache,
}

impl LocalPlatform {
    pub fn new(factories: ResourceFactoryCache) -> Self {
        Self { factories }
    }

    pub fn factories(&self) -> &ResourceFactoryCache {
        &self.factories
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new(ResourceFactoryCache::fixed())
    }
}

impl ChannelPlatform for LocalPlatform {
    fn name(&self) -> &'static str {
        "local"
    }

    fn create_transaction_context(&self) -> Result<Arc<TransactionContext>, SystemError> {
        Ok(Arc::new(TransactionContext::with_resources(
            self.factories.clone(),
        )))
    }

    fn release_transaction_context(
        &self,
        transaction: &TransactionContext,
    ) -> Result<(), SystemError> {
        let outcome = transaction.outcome();
        transaction.complete_resources(outcome)?;
        Ok(())
    }
}

/// Platform for runtimes hosted by a container that owns transaction
/// completion. Release only records the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerPlatform;

impl ChannelPlatform for ContainerPlatform {
    fn name(&self) -> &'static str {
        "container"
    }

    fn create_transaction_context(&self) -> Result<Arc<TransactionContext>, SystemError> {
        Ok(Arc::new(TransactionContext::new()))
    }

    fn release_transaction_context(
        &self,
        transaction: &TransactionContext,
    ) -> Result<(), SystemError> {
        tracing::debug!(
            transaction_id = %transaction.id(),
            outcome = %transaction.outcome(),
            "Transaction completion delegated to container"
        );
        Ok(())
    }
}
