//! Invocation contexts: one record per service call.
//!
//! A root context is created when no context is current for the running
//! execution. It resolves the caller identity once and caches it. Every
//! nested call creates a child that delegates identity resolution to its
//! parent. Contexts are never reused: once popped they are invalidated and
//! every further read fails.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{ContextId, InterfaceId};

use crate::identity::{ApplicationInfo, ComponentRef, Principal, PrincipalProvider, SessionContext};
use crate::transition::TransactionBehavior;
use crate::{ContextError, Result};

/// Everything needed to create an invocation context for one call.
#[derive(Debug, Clone)]
pub struct InvocationTarget {
    pub target: InterfaceId,
    pub component: ComponentRef,
    pub invoking_application: ApplicationInfo,
    pub session: Option<SessionContext>,
    pub behavior: TransactionBehavior,
}

#[derive(Debug)]
enum Identity {
    /// Resolved once when the root context was created.
    Resolved(Option<Principal>),
    /// Asks the parent context.
    Delegated(InvocationContext),
}

#[derive(Debug)]
struct Inner {
    id: ContextId,
    target: InvocationTarget,
    identity: Identity,
    depth: usize,
    valid: AtomicBool,
}

/// Identifies one service call and the call tree it belongs to.
///
/// Cloning yields another handle to the same context.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    inner: Arc<Inner>,
}

impl InvocationContext {
    /// Creates a root context and resolves the caller identity.
    pub fn root(target: InvocationTarget, principals: &dyn PrincipalProvider) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ContextId::new(),
                target,
                identity: Identity::Resolved(principals.current_principal()),
                depth: 0,
                valid: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a child of `parent`.
    pub fn child(parent: &InvocationContext, target: InvocationTarget) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: ContextId::new(),
                target,
                identity: Identity::Delegated(parent.clone()),
                depth: parent.inner.depth + 1,
                valid: AtomicBool::new(true),
            }),
        }
    }

    /// Returns the context ID. The ID stays readable after invalidation so
    /// that misuse can be reported.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Returns the nesting depth; a root context has depth 0.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn is_root(&self) -> bool {
        matches!(self.inner.identity, Identity::Resolved(_))
    }

    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Fails if the context was already invalidated.
    pub fn check_validity(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ContextError::InvocationContextInvalidated {
                context_id: self.inner.id,
            })
        }
    }

    /// Returns the called service interface.
    pub fn target(&self) -> Result<InterfaceId> {
        self.check_validity()?;
        Ok(self.inner.target.target)
    }

    /// Returns the component that owns the called service.
    pub fn component(&self) -> Result<&ComponentRef> {
        self.check_validity()?;
        Ok(&self.inner.target.component)
    }

    /// Returns the application that originated the call tree.
    pub fn invoking_application(&self) -> Result<&ApplicationInfo> {
        self.check_validity()?;
        Ok(&self.inner.target.invoking_application)
    }

    /// Returns the session the call belongs to, if any.
    pub fn session(&self) -> Result<Option<&SessionContext>> {
        self.check_validity()?;
        Ok(self.inner.target.session.as_ref())
    }

    /// Returns the propagation behaviour the call was issued with.
    pub fn behavior(&self) -> Result<TransactionBehavior> {
        self.check_validity()?;
        Ok(self.inner.target.behavior)
    }

    /// Returns the parent context, `None` for a root.
    pub fn parent(&self) -> Result<Option<&InvocationContext>> {
        self.check_validity()?;
        match &self.inner.identity {
            Identity::Resolved(_) => Ok(None),
            Identity::Delegated(parent) => Ok(Some(parent)),
        }
    }

    /// Returns the caller identity of the whole call tree.
    pub fn caller(&self) -> Result<Option<Principal>> {
        self.check_validity()?;
        match &self.inner.identity {
            Identity::Resolved(principal) => Ok(principal.clone()),
            Identity::Delegated(parent) => parent.caller(),
        }
    }

    /// Returns true if both handles refer to the same context.
    pub fn same_as(&self, other: &InvocationContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }

    pub(crate) fn target_unchecked(&self) -> &InvocationTarget {
        &self.inner.target
    }

    pub(crate) fn parent_unchecked(&self) -> Option<&InvocationContext> {
        match &self.inner.identity {
            Identity::Resolved(_) => None,
            Identity::Delegated(parent) => Some(parent),
        }
    }
}
