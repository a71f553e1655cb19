//! Hosting environments of a runtime.
//!
//! The environment decides which channel platform the runtime uses, how the
//! bootstrap transaction is obtained, whether triggers may be scheduled and
//! what happens on shutdown.

use std::sync::Arc;

use channel::{ChannelPlatform, ContainerPlatform, LocalPlatform};
use context::{ResourceFactoryCache, TransactionContext, TxOutcome};

use crate::error::{LifecycleError, Result};

/// Progress of a bootstrap transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapStatus {
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// The transaction that service provider initialization runs in.
pub trait BootstrapTransaction: Send {
    /// Starts the transaction. Returns the context to bind while providers
    /// initialize, if the environment exposes one.
    fn begin(&mut self) -> Result<Option<Arc<TransactionContext>>>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn status(&self) -> BootstrapStatus;
}

/// Bootstrap transaction backed by a transaction context of the channel
/// platform.
pub struct PlatformBootstrapTransaction {
    platform: Arc<dyn ChannelPlatform>,
    transaction: Option<Arc<TransactionContext>>,
    status: BootstrapStatus,
}

impl PlatformBootstrapTransaction {
    pub fn new(platform: Arc<dyn ChannelPlatform>) -> Self {
        Self {
            platform,
            transaction: None,
            status: BootstrapStatus::Idle,
        }
    }

    fn complete(&mut self, action: &'static str, rollback: bool) -> Result<()> {
        if self.status != BootstrapStatus::Active {
            return Err(LifecycleError::BootstrapTransaction {
                action,
                reason: format!("transaction is {:?}", self.status),
            });
        }
        let Some(transaction) = self.transaction.take() else {
            return Err(LifecycleError::BootstrapTransaction {
                action,
                reason: "no transaction context".to_string(),
            });
        };
        if rollback {
            transaction
                .set_rollback_only()
                .map_err(|e| LifecycleError::BootstrapTransaction {
                    action,
                    reason: e.to_string(),
                })?;
        }
        let released = self.platform.release_transaction_context(&transaction);
        transaction.invalidate();
        self.status = if transaction.outcome() == TxOutcome::Commit {
            BootstrapStatus::Committed
        } else {
            BootstrapStatus::RolledBack
        };
        released.map_err(|e| LifecycleError::BootstrapTransaction {
            action,
            reason: e.to_string(),
        })?;
        if !rollback && self.status == BootstrapStatus::RolledBack {
            return Err(LifecycleError::BootstrapTransaction {
                action,
                reason: "transaction was marked for rollback".to_string(),
            });
        }
        Ok(())
    }
}

impl BootstrapTransaction for PlatformBootstrapTransaction {
    fn begin(&mut self) -> Result<Option<Arc<TransactionContext>>> {
        if self.status != BootstrapStatus::Idle {
            return Err(LifecycleError::BootstrapTransaction {
                action: "begin",
                reason: format!("transaction is {:?}", self.status),
            });
        }
        let transaction = self.platform.create_transaction_context().map_err(|e| {
            LifecycleError::BootstrapTransaction {
                action: "begin",
                reason: e.to_string(),
            }
        })?;
        tracing::debug!(transaction_id = %transaction.id(), "Bootstrap transaction started");
        self.transaction = Some(transaction.clone());
        self.status = BootstrapStatus::Active;
        Ok(Some(transaction))
    }

    fn commit(&mut self) -> Result<()> {
        self.complete("commit", false)
    }

    fn rollback(&mut self) -> Result<()> {
        self.complete("roll back", true)
    }

    fn status(&self) -> BootstrapStatus {
        self.status
    }
}

pub trait Environment: Send + Sync {
    fn name(&self) -> &'static str;

    fn create_platform(&self) -> Arc<dyn ChannelPlatform>;

    fn bootstrap_transaction(
        &self,
        platform: Arc<dyn ChannelPlatform>,
    ) -> Box<dyn BootstrapTransaction> {
        Box::new(PlatformBootstrapTransaction::new(platform))
    }

    /// Whether the runtime may schedule its triggers itself.
    fn supports_scheduling(&self) -> bool {
        true
    }

    /// Environment specific cleanup after the channel has been closed.
    fn perform_shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Standalone process. Transactions complete their resources locally.
#[derive(Debug, Clone)]
pub struct LocalEnvironment {
    factories: ResourceFactoryCache,
}

impl LocalEnvironment {
    pub fn new(factories: ResourceFactoryCache) -> Self {
        Self { factories }
    }
}

impl Default for LocalEnvironment {
    fn default() -> Self {
        Self::new(ResourceFactoryCache::fixed())
    }
}

impl Environment for LocalEnvironment {
    fn name(&self) -> &'static str {
        "local"
    }

    fn create_platform(&self) -> Arc<dyn ChannelPlatform> {
        Arc::new(LocalPlatform::new(self.factories.clone()))
    }
}

/// Runtime hosted by a container that owns transaction completion and
/// scheduling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerEnvironment;

impl Environment for ContainerEnvironment {
    fn name(&self) -> &'static str {
        "container"
    }

    fn create_platform(&self) -> Arc<dyn ChannelPlatform> {
        Arc::new(ContainerPlatform)
    }

    fn supports_scheduling(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_completes_active_transaction() {
        let mut tx = PlatformBootstrapTransaction::new(Arc::new(LocalPlatform::default()));
        let context = tx.begin().unwrap().unwrap();
        assert_eq!(tx.status(), BootstrapStatus::Active);
        tx.commit().unwrap();
        assert_eq!(tx.status(), BootstrapStatus::Committed);
        assert!(!context.is_valid());
    }

    #[test]
    fn test_rollback_marks_context() {
        let mut tx = PlatformBootstrapTransaction::new(Arc::new(LocalPlatform::default()));
        tx.begin().unwrap();
        tx.rollback().unwrap();
        assert_eq!(tx.status(), BootstrapStatus::RolledBack);
    }

    #[test]
    fn test_commit_of_rollback_only_transaction_fails() {
        let mut tx = PlatformBootstrapTransaction::new(Arc::new(LocalPlatform::default()));
        let context = tx.begin().unwrap().unwrap();
        context.set_rollback_only().unwrap();
        let err = tx.commit().unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::BootstrapTransaction { action: "commit", .. }
        ));
        assert_eq!(tx.status(), BootstrapStatus::RolledBack);
    }

    #[test]
    fn test_begin_twice_fails() {
        let mut tx = PlatformBootstrapTransaction::new(Arc::new(ContainerPlatform));
        tx.begin().unwrap();
        assert!(tx.begin().is_err());
    }

    #[test]
    fn test_commit_without_begin_fails() {
        let mut tx = PlatformBootstrapTransaction::new(Arc::new(ContainerPlatform));
        assert!(tx.commit().is_err());
        assert_eq!(tx.status(), BootstrapStatus::Idle);
    }

    #[test]
    fn test_container_does_not_schedule() {
        assert!(!ContainerEnvironment.supports_scheduling());
        assert!(LocalEnvironment::default().supports_scheduling());
        assert_eq!(ContainerEnvironment.create_platform().name(), "container");
    }
}
