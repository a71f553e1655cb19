//! Binds invocation and transaction contexts to the running task.
//!
//! Each execution (a tokio task, or the part of a task running inside
//! [`ExecutionScope::run`]) owns one scope. The scope holds the current
//! invocation context and the bound transaction context. Every dispatched
//! call runs in a [fork](ExecutionScope::fork) of its caller's scope, so
//! sibling calls polled concurrently on one task never see each other's
//! contexts. A freshly spawned task has no scope and therefore starts a new
//! call tree.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::identity::{ComponentRef, Principal, PrincipalProvider, SessionContext};
use crate::invocation::{InvocationContext, InvocationTarget};
use crate::sink::{ContextTrace, TraceSink, TracingSink};
use crate::transaction::{Resource, TransactionContext};
use crate::transition::TxStatus;
use crate::{ContextError, Result};

tokio::task_local! {
    static SCOPE: ExecutionScope;
}

#[derive(Default)]
struct ScopeState {
    current: Option<InvocationContext>,
    transaction: Option<Arc<TransactionContext>>,
}

/// Per-execution context state with an explicit handle.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct ExecutionScope {
    state: Arc<Mutex<ScopeState>>,
    sink: Arc<dyn TraceSink>,
}

impl ExecutionScope {
    /// Creates an empty scope that traces through `tracing`.
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Creates an empty scope with a custom trace sink.
    pub fn with_sink(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            state: Arc::default(),
            sink,
        }
    }

    /// Returns a new scope starting from this scope's current context and
    /// bound transaction.
    ///
    /// Pushes, pops and transaction changes on the fork are invisible to this
    /// scope and to other forks.
    pub fn fork(&self) -> Self {
        let state = {
            let state = self.state();
            ScopeState {
                current: state.current.clone(),
                transaction: state.transaction.clone(),
            }
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            sink: self.sink.clone(),
        }
    }

    /// Returns the scope of the current execution, if one is active.
    pub fn current() -> Option<ExecutionScope> {
        SCOPE.try_with(|scope| scope.clone()).ok()
    }

    /// Runs `future` with this scope as the current one.
    pub async fn run<F: Future>(self, future: F) -> F::Output {
        SCOPE.scope(self, future).await
    }

    fn state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the current invocation context.
    pub fn current_context(&self) -> Option<InvocationContext> {
        self.state().current.clone()
    }

    /// Pushes a new invocation context and makes it current.
    ///
    /// The new context is a root if no context is current, otherwise a
    /// child of the current one.
    pub fn push(
        &self,
        target: InvocationTarget,
        principals: &dyn PrincipalProvider,
    ) -> InvocationContext {
        let context = {
            let mut state = self.state();
            let context = match &state.current {
                Some(parent) => InvocationContext::child(parent, target),
                None => InvocationContext::root(target, principals),
            };
            state.current = Some(context.clone());
            context
        };

        self.sink.context_pushed(&trace_of(&context));
        context
    }

    /// Pops `context`, restores its parent as current and invalidates it.
    ///
    /// Fails with [`ContextError::NotCurrent`] if `context` is not the
    /// current context; the stack is left unchanged in that case.
    pub fn pop(&self, context: &InvocationContext) -> Result<()> {
        {
            let mut state = self.state();
            match &state.current {
                Some(current) if current.same_as(context) => {}
                other => {
                    return Err(ContextError::NotCurrent {
                        context_id: context.id(),
                        current: other
                            .as_ref()
                            .map(|c| c.id().to_string())
                            .unwrap_or_else(|| "none".to_string()),
                    });
                }
            }
            state.current = context.parent_unchecked().cloned();
        }

        context.invalidate();
        self.sink.context_popped(&trace_of(context));
        Ok(())
    }

    /// Returns the number of contexts on the stack.
    pub fn depth(&self) -> usize {
        self.state()
            .current
            .as_ref()
            .map(|c| c.depth() + 1)
            .unwrap_or(0)
    }

    /// Returns the bound transaction context.
    pub fn transaction(&self) -> Option<Arc<TransactionContext>> {
        self.state().transaction.clone()
    }

    /// Returns whether a transaction is bound.
    pub fn status(&self) -> TxStatus {
        if self.state().transaction.is_some() {
            TxStatus::Running
        } else {
            TxStatus::None
        }
    }

    /// Binds `transaction` and returns the previously bound one.
    pub fn bind_transaction(
        &self,
        transaction: Arc<TransactionContext>,
    ) -> Option<Arc<TransactionContext>> {
        self.state().transaction.replace(transaction)
    }

    /// Unbinds the current transaction (suspend) and returns it.
    pub fn unbind_transaction(&self) -> Option<Arc<TransactionContext>> {
        self.state().transaction.take()
    }

    /// Restores a previously bound transaction, or the absence of one.
    pub fn restore_transaction(&self, previous: Option<Arc<TransactionContext>>) {
        self.state().transaction = previous;
    }
}

impl Default for ExecutionScope {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("ExecutionScope")
            .field("current", &state.current.as_ref().map(|c| c.id()))
            .field("transaction", &state.transaction.as_ref().map(|t| t.id()))
            .finish()
    }
}

fn trace_of(context: &InvocationContext) -> ContextTrace {
    let target = context.target_unchecked();
    ContextTrace {
        context_id: context.id(),
        target: target.target,
        component: target.component.name().to_string(),
        depth: context.depth(),
    }
}

/// Read access to the contexts of the running service call.
///
/// Service implementations use this to learn who called them and to reach
/// the transaction they run in.
pub struct Context;

impl Context {
    /// Returns the current invocation context, if a call is in progress.
    pub fn current() -> Option<InvocationContext> {
        ExecutionScope::current().and_then(|scope| scope.current_context())
    }

    /// Returns the current invocation context or fails.
    pub fn invocation() -> Result<InvocationContext> {
        Self::current().ok_or(ContextError::NoInvocationContext)
    }

    /// Returns the bound transaction context, if any.
    pub fn transaction() -> Option<Arc<TransactionContext>> {
        ExecutionScope::current().and_then(|scope| scope.transaction())
    }

    pub fn session() -> Result<Option<SessionContext>> {
        Ok(Self::invocation()?.session()?.cloned())
    }

    pub fn component() -> Result<ComponentRef> {
        Ok(Self::invocation()?.component()?.clone())
    }

    pub fn caller() -> Result<Option<Principal>> {
        Self::invocation()?.caller()
    }

    /// Marks the bound transaction for rollback.
    pub fn set_rollback_only() -> Result<()> {
        Self::transaction()
            .ok_or(ContextError::NoTransaction)?
            .set_rollback_only()
    }

    /// Returns the resource of the current component's resource unit in the
    /// bound transaction.
    pub fn resource() -> Result<Arc<dyn Resource>> {
        let component = Self::component()?;
        let unit = component
            .resource_unit()
            .ok_or_else(|| ContextError::NoResourceUnit {
                component: component.name().to_string(),
            })?;
        Self::transaction()
            .ok_or(ContextError::NoTransaction)?
            .resource(unit)
    }
}
