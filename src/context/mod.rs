// Call-chain transaction context
// The per-call-chain slot holding the currently active resource
// transaction and its synchronization list. Explicitly threaded through
// every manager and template call; it never travels to another thread
// unless the caller carries it there.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::definition::Isolation;
use crate::manager::TransactionError;
use crate::resource::ResourceHandle;
use crate::sync::TransactionSynchronization;

/// Shared state of one physical resource transaction. Every status that
/// participates in the same resource transaction aliases this value;
/// that is how a participant's rollback poisons the owning commit.
pub(crate) struct SharedTransaction {
    handle: ResourceHandle,
    isolation: Isolation,
    read_only: bool,
    name: Option<String>,
    rollback_only: AtomicBool,
    synchronizations: Mutex<Vec<Box<dyn TransactionSynchronization>>>,
}

impl SharedTransaction {
    pub(crate) fn new(
        handle: ResourceHandle,
        isolation: Isolation,
        read_only: bool,
        name: Option<String>,
    ) -> Self {
        Self {
            handle,
            isolation,
            read_only,
            name,
            rollback_only: AtomicBool::new(false),
            synchronizations: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn handle(&self) -> ResourceHandle {
        self.handle
    }

    pub(crate) fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub(crate) fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    pub(crate) fn push_synchronization(&self, sync: Box<dyn TransactionSynchronization>) {
        self.synchronizations.lock().push(sync);
    }

    /// Take the synchronization list for firing. Completion consumes the
    /// list, which is what makes after-completion fire exactly once.
    pub(crate) fn take_synchronizations(&self) -> Vec<Box<dyn TransactionSynchronization>> {
        std::mem::take(&mut *self.synchronizations.lock())
    }
}

/// Opaque snapshot of a suspended transaction, produced by suspend and
/// consumed by resume. The token ties it to its position on the
/// suspension stack; resuming out of order is a programming error and
/// fails fast.
pub struct SuspendedResources {
    pub(crate) transaction: Arc<SharedTransaction>,
    token: u64,
}

/// Per-call-chain transaction slot plus the LIFO suspension stack.
///
/// Exactly one context exists per logical call chain; concurrent call
/// chains each construct their own. The same manager instance can be
/// shared across all of them.
#[derive(Default)]
pub struct TransactionContext {
    current: Option<Arc<SharedTransaction>>,
    suspension_stack: Vec<u64>,
    next_token: u64,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a resource transaction is active in this call chain
    pub fn has_active_transaction(&self) -> bool {
        self.current.is_some()
    }

    /// Depth of the suspension stack
    pub fn suspension_depth(&self) -> usize {
        self.suspension_stack.len()
    }

    /// Register a synchronization callback with the active transaction.
    /// Fails when no transaction is active in this call chain.
    pub fn register_synchronization(
        &self,
        sync: Box<dyn TransactionSynchronization>,
    ) -> Result<(), TransactionError> {
        match &self.current {
            Some(transaction) => {
                transaction.push_synchronization(sync);
                Ok(())
            }
            None => Err(TransactionError::IllegalState(
                "cannot register synchronization: no transaction is active".to_string(),
            )),
        }
    }

    pub(crate) fn current(&self) -> Option<&Arc<SharedTransaction>> {
        self.current.as_ref()
    }

    pub(crate) fn set_current(&mut self, transaction: Arc<SharedTransaction>) {
        self.current = Some(transaction);
    }

    pub(crate) fn clear_current(&mut self) {
        self.current = None;
    }

    /// Detach the active transaction, pushing its token onto the
    /// suspension stack
    pub(crate) fn suspend(&mut self) -> Result<SuspendedResources, TransactionError> {
        let transaction = self.current.take().ok_or_else(|| {
            TransactionError::IllegalState(
                "cannot suspend: no transaction is active".to_string(),
            )
        })?;
        let token = self.next_token;
        self.next_token += 1;
        self.suspension_stack.push(token);
        Ok(SuspendedResources { transaction, token })
    }

    /// Restore a previously suspended transaction. Suspension is a
    /// strict stack discipline; only the most recently suspended
    /// transaction may be resumed.
    pub(crate) fn resume(&mut self, suspended: SuspendedResources) -> Result<(), TransactionError> {
        match self.suspension_stack.last() {
            Some(&token) if token == suspended.token => {
                self.suspension_stack.pop();
                self.current = Some(suspended.transaction);
                Ok(())
            }
            _ => Err(TransactionError::IllegalState(
                "suspended transaction resumed out of order".to_string(),
            )),
        }
    }
}
