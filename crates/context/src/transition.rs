//! Transaction propagation decision table.

use serde::{Deserialize, Serialize};

/// Declared policy describing how a call relates to an ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionBehavior {
    /// Runs without a transaction; an ambient one is suspended.
    NotSupported,
    /// Joins an ambient transaction if there is one.
    Supports,
    /// Joins an ambient transaction or starts a new one.
    Required,
    /// Always starts a new transaction.
    RequiresNew,
    /// Requires an ambient transaction.
    Mandatory,
    /// Must not be called inside a transaction.
    Never,
}

impl TransactionBehavior {
    /// All behaviours in declaration order.
    pub const ALL: [TransactionBehavior; 6] = [
        TransactionBehavior::NotSupported,
        TransactionBehavior::Supports,
        TransactionBehavior::Required,
        TransactionBehavior::RequiresNew,
        TransactionBehavior::Mandatory,
        TransactionBehavior::Never,
    ];

    /// Returns true if the rollback-only flag of the bound transaction may
    /// be inspected after a call with this behaviour.
    pub fn permits_rollback_inspection(&self) -> bool {
        !matches!(
            self,
            TransactionBehavior::NotSupported
                | TransactionBehavior::Supports
                | TransactionBehavior::Never
        )
    }

    /// Returns the behaviour name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionBehavior::NotSupported => "NotSupported",
            TransactionBehavior::Supports => "Supports",
            TransactionBehavior::Required => "Required",
            TransactionBehavior::RequiresNew => "RequiresNew",
            TransactionBehavior::Mandatory => "Mandatory",
            TransactionBehavior::Never => "Never",
        }
    }
}

impl std::fmt::Display for TransactionBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a transaction is bound to the current execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxStatus {
    None,
    Running,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxStatus::None => write!(f, "NoTransaction"),
            TxStatus::Running => write!(f, "TransactionRunning"),
        }
    }
}

/// Change the dispatcher applies to the transaction binding for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionDecision {
    /// Start a new transaction for the call.
    NewRequired,
    /// Suspend the ambient transaction for the call.
    SuspendRequired,
    /// Keep the binding as it is.
    Unchanged,
    /// The combination is not allowed; the call must be rejected.
    Invalid,
}

impl std::fmt::Display for TransitionDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransitionDecision::NewRequired => "NewRequired",
            TransitionDecision::SuspendRequired => "SuspendRequired",
            TransitionDecision::Unchanged => "Unchanged",
            TransitionDecision::Invalid => "Invalid",
        };
        write!(f, "{name}")
    }
}

/// Maps the current transaction status and the declared behaviour of a
/// call to the transition the dispatcher must perform.
///
/// ```text
/// Behavior       None          Running
/// NotSupported   Unchanged     SuspendRequired
/// Supports       Unchanged     Unchanged
/// Required       NewRequired   Unchanged
/// RequiresNew    NewRequired   NewRequired
/// Mandatory      Invalid       Unchanged
/// Never          Unchanged     Invalid
/// ```
pub const fn decide(status: TxStatus, behavior: TransactionBehavior) -> TransitionDecision {
    use TransactionBehavior as B;
    use TransitionDecision as D;

    match (behavior, status) {
        (B::NotSupported, TxStatus::None) => D::Unchanged,
        (B::NotSupported, TxStatus::Running) => D::SuspendRequired,
        (B::Supports, _) => D::Unchanged,
        (B::Required, TxStatus::None) => D::NewRequired,
        (B::Required, TxStatus::Running) => D::Unchanged,
        (B::RequiresNew, _) => D::NewRequired,
        (B::Mandatory, TxStatus::None) => D::Invalid,
        (B::Mandatory, TxStatus::Running) => D::Unchanged,
        (B::Never, TxStatus::None) => D::Unchanged,
        (B::Never, TxStatus::Running) => D::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use TransactionBehavior as B;
    use TransitionDecision as D;

    #[test]
    fn test_table_without_transaction() {
        assert_eq!(decide(TxStatus::None, B::NotSupported), D::Unchanged);
        assert_eq!(decide(TxStatus::None, B::Supports), D::Unchanged);
        assert_eq!(decide(TxStatus::None, B::Required), D::NewRequired);
        assert_eq!(decide(TxStatus::None, B::RequiresNew), D::NewRequired);
        assert_eq!(decide(TxStatus::None, B::Mandatory), D::Invalid);
        assert_eq!(decide(TxStatus::None, B::Never), D::Unchanged);
    }

    #[test]
    fn test_table_with_running_transaction() {
        assert_eq!(decide(TxStatus::Running, B::NotSupported), D::SuspendRequired);
        assert_eq!(decide(TxStatus::Running, B::Supports), D::Unchanged);
        assert_eq!(decide(TxStatus::Running, B::Required), D::Unchanged);
        assert_eq!(decide(TxStatus::Running, B::RequiresNew), D::NewRequired);
        assert_eq!(decide(TxStatus::Running, B::Mandatory), D::Unchanged);
        assert_eq!(decide(TxStatus::Running, B::Never), D::Invalid);
    }

    #[test]
    fn test_only_two_cells_are_invalid() {
        let invalid: Vec<_> = [TxStatus::None, TxStatus::Running]
            .into_iter()
            .flat_map(|s| B::ALL.into_iter().map(move |b| (s, b)))
            .filter(|(s, b)| decide(*s, *b) == D::Invalid)
            .collect();

        assert_eq!(
            invalid,
            vec![(TxStatus::None, B::Mandatory), (TxStatus::Running, B::Never)]
        );
    }

    #[test]
    fn test_rollback_inspection() {
        assert!(!B::NotSupported.permits_rollback_inspection());
        assert!(!B::Supports.permits_rollback_inspection());
        assert!(B::Required.permits_rollback_inspection());
        assert!(B::RequiresNew.permits_rollback_inspection());
        assert!(B::Mandatory.permits_rollback_inspection());
        assert!(!B::Never.permits_rollback_inspection());
    }

    #[test]
    fn test_display() {
        assert_eq!(B::RequiresNew.to_string(), "RequiresNew");
        assert_eq!(TxStatus::None.to_string(), "NoTransaction");
        assert_eq!(D::SuspendRequired.to_string(), "SuspendRequired");
    }
}
