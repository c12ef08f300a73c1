// Transaction synchronization callbacks
// Ordered callbacks invoked at well-defined lifecycle points of a
// new-transaction lifecycle: before commit, after commit, and exactly
// once after completion with the final outcome.

use thiserror::Error;

/// Outcome passed to `after_completion`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The transaction committed
    Committed,
    /// The transaction rolled back, explicitly or via rollback-only
    RolledBack,
    /// The resource manager failed mid-completion; the real outcome is
    /// not known to the engine
    Unknown,
}

/// Error raised by a before-commit callback. Failing before commit
/// forces the transaction onto the rollback path.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct SynchronizationError(String);

impl SynchronizationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Callback interface for transaction lifecycle notifications.
///
/// Registered through the transaction context while a transaction is
/// active; callbacks fire in registration order when the owning
/// transaction completes.
pub trait TransactionSynchronization: Send {
    /// Invoked before the resource transaction commits. Returning an
    /// error rolls the transaction back instead.
    fn before_commit(&mut self, read_only: bool) -> Result<(), SynchronizationError> {
        let _ = read_only;
        Ok(())
    }

    /// Invoked after a successful resource commit
    fn after_commit(&mut self) {}

    /// Invoked exactly once per new-transaction lifecycle, whichever
    /// completion path was taken
    fn after_completion(&mut self, status: CompletionStatus) {
        let _ = status;
    }
}
