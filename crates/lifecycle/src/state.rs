//! Lifecycle state machine of the runtime.

use serde::{Deserialize, Serialize};

/// The state of a runtime.
///
/// State transitions:
/// ```text
/// NotInitialized ──► Initialized ──► Shutdown
/// ```
///
/// A failed bootstrap leaves the runtime in `NotInitialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LifecycleState {
    /// Nothing has been created yet.
    #[default]
    NotInitialized,

    /// Registries are populated and the channel accepts calls.
    Initialized,

    /// The runtime was shut down (terminal state).
    Shutdown,
}

impl LifecycleState {
    /// Returns true if the runtime can be bootstrapped.
    pub fn can_initialize(&self) -> bool {
        matches!(self, LifecycleState::NotInitialized)
    }

    /// Returns true if the runtime can be shut down.
    pub fn can_shutdown(&self) -> bool {
        matches!(self, LifecycleState::Initialized)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Shutdown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::NotInitialized => "NotInitialized",
            LifecycleState::Initialized => "Initialized",
            LifecycleState::Shutdown => "Shutdown",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
