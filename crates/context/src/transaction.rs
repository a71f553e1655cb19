//! Transaction contexts and the transactional resources opened inside them.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use common::TransactionId;
use serde::{Deserialize, Serialize};

use crate::{ContextError, Result};

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Commit,
    Rollback,
}

impl TxOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxOutcome::Commit => "commit",
            TxOutcome::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A transactional resource (connection, unit of work, ...) bound to one
/// transaction for its whole lifetime.
pub trait Resource: Send + Sync {
    /// Name of the resource unit this resource was opened for.
    fn unit(&self) -> &str;

    /// Makes the work done through this resource durable.
    fn commit(&self) -> Result<()>;

    /// Discards the work done through this resource.
    fn rollback(&self) -> Result<()>;

    /// Allows callers to reach the concrete resource type.
    fn as_any(&self) -> &dyn Any;
}

/// Opens resources for one resource unit.
pub trait ResourceFactory: Send + Sync {
    fn create_resource(&self, unit: &str) -> Result<Arc<dyn Resource>>;
}

type FactoryBuilder = dyn Fn(&str) -> Result<Arc<dyn ResourceFactory>> + Send + Sync;

/// Process-wide cache of resource factories keyed by resource unit name.
///
/// Factories are built on first use. When two executions race to build the
/// factory for the same unit, the first stored factory wins and is the one
/// every caller gets.
#[derive(Clone)]
pub struct ResourceFactoryCache {
    factories: Arc<RwLock<HashMap<String, Arc<dyn ResourceFactory>>>>,
    builder: Arc<FactoryBuilder>,
}

impl ResourceFactoryCache {
    /// Creates a cache that builds missing factories with `builder`.
    pub fn new<F>(builder: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn ResourceFactory>> + Send + Sync + 'static,
    {
        Self {
            factories: Arc::default(),
            builder: Arc::new(builder),
        }
    }

    /// Creates a cache that only serves explicitly registered factories.
    pub fn fixed() -> Self {
        Self::new(|unit| {
            Err(ContextError::ResourceUnavailable {
                unit: unit.to_string(),
                reason: "no resource factory registered".to_string(),
            })
        })
    }

    /// Registers a factory for `unit`, replacing any cached one.
    pub fn register(&self, unit: impl Into<String>, factory: Arc<dyn ResourceFactory>) {
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit.into(), factory);
    }

    /// Returns the cached factory for `unit` without building one.
    pub fn cached(&self, unit: &str) -> Option<Arc<dyn ResourceFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(unit)
            .cloned()
    }

    /// Returns the factory for `unit`, building and caching it if needed.
    pub fn get_or_create(&self, unit: &str) -> Result<Arc<dyn ResourceFactory>> {
        if let Some(factory) = self.cached(unit) {
            return Ok(factory);
        }

        // Built outside the lock; a concurrent builder may finish first.
        let built = (self.builder)(unit)?;
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(factories.entry(unit.to_string()).or_insert(built).clone())
    }

    /// Number of cached factories.
    pub fn len(&self) -> usize {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ResourceFactoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceFactoryCache")
            .field("units", &self.len())
            .finish()
    }
}

/// One logical transaction.
///
/// The rollback-only flag is sticky: once set it can never be cleared.
/// Resources opened through [`TransactionContext::resource`] are cached per
/// unit so every call inside the transaction shares them.
pub struct TransactionContext {
    id: TransactionId,
    started_at: DateTime<Utc>,
    rollback_only: AtomicBool,
    valid: AtomicBool,
    resources: Mutex<HashMap<String, Arc<dyn Resource>>>,
    factories: Option<ResourceFactoryCache>,
}

impl TransactionContext {
    /// Creates a transaction without resource support.
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            started_at: Utc::now(),
            rollback_only: AtomicBool::new(false),
            valid: AtomicBool::new(true),
            resources: Mutex::default(),
            factories: None,
        }
    }

    /// Creates a transaction that opens resources from `factories`.
    pub fn with_resources(factories: ResourceFactoryCache) -> Self {
        Self {
            factories: Some(factories),
            ..Self::new()
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn check_validity(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ContextError::TransactionContextInvalidated {
                transaction_id: self.id,
            })
        }
    }

    /// Marks the transaction so it can only end in a rollback.
    pub fn set_rollback_only(&self) -> Result<()> {
        self.check_validity()?;
        self.rollback_only.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_rollback_only(&self) -> Result<bool> {
        self.check_validity()?;
        Ok(self.rollback_only.load(Ordering::Acquire))
    }

    /// Returns the outcome the transaction will end with.
    pub fn outcome(&self) -> TxOutcome {
        if self.rollback_only.load(Ordering::Acquire) {
            TxOutcome::Rollback
        } else {
            TxOutcome::Commit
        }
    }

    /// Returns the resource for `unit`, opening it on first use.
    pub fn resource(&self, unit: &str) -> Result<Arc<dyn Resource>> {
        self.check_validity()?;

        let mut resources = self.resources.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(resource) = resources.get(unit) {
            return Ok(resource.clone());
        }

        let factories = self
            .factories
            .as_ref()
            .ok_or_else(|| ContextError::ResourceUnavailable {
                unit: unit.to_string(),
                reason: "transaction has no resource support".to_string(),
            })?;
        let resource = factories.get_or_create(unit)?.create_resource(unit)?;
        resources.insert(unit.to_string(), resource.clone());

        tracing::debug!(transaction_id = %self.id, unit, "Opened transactional resource");
        Ok(resource)
    }

    /// Returns all resources opened so far.
    pub fn resources(&self) -> Vec<Arc<dyn Resource>> {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Commits or rolls back every opened resource.
    ///
    /// All resources are completed even if one fails; the first failure is
    /// returned. The resources are released afterwards.
    pub fn complete_resources(&self, outcome: TxOutcome) -> Result<()> {
        let resources: Vec<_> = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, resource)| resource)
            .collect();

        let mut first_error = None;
        for resource in resources {
            let result = match outcome {
                TxOutcome::Commit => resource.commit(),
                TxOutcome::Rollback => resource.rollback(),
            };
            if let Err(e) = result {
                tracing::warn!(
                    transaction_id = %self.id,
                    unit = resource.unit(),
                    outcome = %outcome,
                    error = %e,
                    "Failed to complete transactional resource"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Ends the transaction context; every further use fails.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("rollback_only", &self.rollback_only.load(Ordering::Relaxed))
            .field("valid", &self.is_valid())
            .finish()
    }
}
