// Transaction status
// Mutable handle representing one in-flight (or suspended) transactional
// unit. Created by the manager, mutated by the unit of work and by the
// manager during completion.

use std::sync::Arc;

use crate::context::{SharedTransaction, SuspendedResources};
use crate::resource::Savepoint;

/// Handle to one transactional unit of work.
///
/// A status either owns a brand-new resource transaction, participates
/// in an existing one, is scoped to a savepoint within an existing one,
/// or represents non-transactional execution. Completion happens exactly
/// once; committing or rolling back a completed status is an error.
pub struct TransactionStatus {
    transaction: Option<Arc<SharedTransaction>>,
    new_transaction: bool,
    savepoint: Option<Savepoint>,
    local_rollback_only: bool,
    completed: bool,
    suspended: Option<SuspendedResources>,
}

impl TransactionStatus {
    /// Status owning a newly started resource transaction, optionally
    /// carrying the suspended outer transaction it displaced
    pub(crate) fn new_transaction(
        transaction: Arc<SharedTransaction>,
        suspended: Option<SuspendedResources>,
    ) -> Self {
        Self {
            transaction: Some(transaction),
            new_transaction: true,
            savepoint: None,
            local_rollback_only: false,
            completed: false,
            suspended,
        }
    }

    /// Status participating in an existing resource transaction
    pub(crate) fn participating(transaction: Arc<SharedTransaction>) -> Self {
        Self {
            transaction: Some(transaction),
            new_transaction: false,
            savepoint: None,
            local_rollback_only: false,
            completed: false,
            suspended: None,
        }
    }

    /// Status scoped to a savepoint within an existing transaction
    pub(crate) fn savepoint_scoped(
        transaction: Arc<SharedTransaction>,
        savepoint: Savepoint,
    ) -> Self {
        Self {
            transaction: Some(transaction),
            new_transaction: false,
            savepoint: Some(savepoint),
            local_rollback_only: false,
            completed: false,
            suspended: None,
        }
    }

    /// Status for non-transactional execution, optionally carrying a
    /// suspended outer transaction
    pub(crate) fn non_transactional(suspended: Option<SuspendedResources>) -> Self {
        Self {
            transaction: None,
            new_transaction: false,
            savepoint: None,
            local_rollback_only: false,
            completed: false,
            suspended,
        }
    }

    /// True when this status created the underlying resource transaction
    /// rather than joining one already active
    pub fn is_new_transaction(&self) -> bool {
        self.new_transaction
    }

    /// True when nested propagation produced a savepoint instead of a
    /// new resource transaction
    pub fn has_savepoint(&self) -> bool {
        self.savepoint.is_some()
    }

    /// True when this unit of work runs inside an actual resource
    /// transaction (its own, or a joined one)
    pub fn is_transactional(&self) -> bool {
        self.transaction.is_some()
    }

    /// True once this status has been committed or rolled back
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Force the eventual commit to become a rollback.
    ///
    /// On a status participating in (or owning) a resource transaction
    /// this marks the shared transaction, so the owning commit is
    /// poisoned no matter which participant set the flag. A
    /// savepoint-scoped status only poisons its own savepoint scope.
    pub fn set_rollback_only(&mut self) {
        match &self.transaction {
            Some(transaction) if self.savepoint.is_none() => transaction.set_rollback_only(),
            _ => self.local_rollback_only = true,
        }
    }

    /// Whether this status is destined for rollback
    pub fn is_rollback_only(&self) -> bool {
        if self.local_rollback_only {
            return true;
        }
        if self.savepoint.is_some() {
            // savepoint scopes are poisoned locally, not by the outer flag
            return false;
        }
        self.transaction
            .as_ref()
            .is_some_and(|transaction| transaction.is_rollback_only())
    }

    pub(crate) fn savepoint(&self) -> Option<Savepoint> {
        self.savepoint
    }

    pub(crate) fn shared(&self) -> Option<Arc<SharedTransaction>> {
        self.transaction.clone()
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
    }

    pub(crate) fn take_suspended(&mut self) -> Option<SuspendedResources> {
        self.suspended.take()
    }
}

impl std::fmt::Debug for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStatus")
            .field("has_transaction", &self.transaction.is_some())
            .field("new_transaction", &self.new_transaction)
            .field("savepoint", &self.savepoint)
            .field("local_rollback_only", &self.local_rollback_only)
            .field("completed", &self.completed)
            .field("has_suspended", &self.suspended.is_some())
            .finish()
    }
}
