//! Observability side channel for context push and pop.

use common::{ContextId, InterfaceId};

/// What a sink learns about a pushed or popped context.
#[derive(Debug, Clone)]
pub struct ContextTrace {
    pub context_id: ContextId,
    pub target: InterfaceId,
    pub component: String,
    pub depth: usize,
}

/// Receives push and pop notifications so nested call traces can be
/// reconstructed outside the runtime.
pub trait TraceSink: Send + Sync {
    fn context_pushed(&self, trace: &ContextTrace);

    fn context_popped(&self, trace: &ContextTrace);
}

/// Default sink that emits `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn context_pushed(&self, trace: &ContextTrace) {
        tracing::debug!(
            context_id = %trace.context_id,
            target = %trace.target,
            component = %trace.component,
            depth = trace.depth,
            "context pushed"
        );
    }

    fn context_popped(&self, trace: &ContextTrace) {
        tracing::debug!(
            context_id = %trace.context_id,
            target = %trace.target,
            component = %trace.component,
            depth = trace.depth,
            "context popped"
        );
    }
}
