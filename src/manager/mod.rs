// Platform transaction manager
// Implements the propagation decision table, resource transaction
// begin/commit/rollback, suspension/resumption and savepoint management.

pub mod status;

use std::sync::Arc;

use log::{debug, error, warn};
use thiserror::Error;

use crate::context::{SharedTransaction, SuspendedResources, TransactionContext};
use crate::definition::{Isolation, Propagation, TransactionDefinition};
use crate::resource::{ResourceError, ResourceManager};
use crate::sync::{CompletionStatus, TransactionSynchronization};

pub use status::TransactionStatus;

/// Errors raised by transaction management
#[derive(Error, Debug)]
pub enum TransactionError {
    /// A propagation rule was violated, a status was completed twice, or
    /// suspended resources were resumed out of order
    #[error("illegal transaction state: {0}")]
    IllegalState(String),

    /// Commit was requested but the transaction was already marked
    /// rollback-only; the work was rolled back, not applied
    #[error("transaction rolled back because it was marked rollback-only")]
    UnexpectedRollback,

    /// The resource manager failed while executing the named operation.
    /// When this failure superseded an application error during rollback
    /// handling, that error is preserved in `application`.
    #[error("resource manager failure during {operation}: {source}")]
    System {
        operation: &'static str,
        #[source]
        source: ResourceError,
        application: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A before-commit synchronization rejected the transaction
    #[error("before-commit synchronization failed: {0}")]
    Synchronization(String),
}

impl TransactionError {
    pub(crate) fn system(operation: &'static str, source: ResourceError) -> Self {
        TransactionError::System {
            operation,
            source,
            application: None,
        }
    }

    /// Attach a superseded application error as the cause of a system
    /// failure; other variants keep the error but log the loss.
    pub(crate) fn with_application_cause(
        self,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        match self {
            TransactionError::System {
                operation, source, ..
            } => TransactionError::System {
                operation,
                source,
                application: Some(cause),
            },
            other => {
                error!("Application error superseded without being attached: {cause}");
                other
            }
        }
    }

    /// The application error this failure superseded, if any
    pub fn application_cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TransactionError::System { application, .. } => application.as_deref(),
            _ => None,
        }
    }
}

/// Result type for transaction management operations
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Strategy interface for transaction management.
///
/// A status-returning manager hands out a `TransactionStatus` from
/// `get_transaction` and expects exactly one later `commit` or
/// `rollback` call for it. The context argument carries the call chain's
/// transaction slot; the manager itself is stateless and can be shared
/// across concurrent call chains.
pub trait PlatformTransactionManager: Send + Sync {
    /// Return a status for the given definition, joining, starting,
    /// suspending or rejecting per the propagation decision table
    fn get_transaction(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus>;

    /// Commit the given transaction, converting to rollback if the
    /// status was marked rollback-only
    fn commit(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()>;

    /// Roll back the given transaction
    fn rollback(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()>;
}

/// Transaction manager driving an abstract resource manager.
///
/// Holds no per-transaction state of its own; everything in flight lives
/// on the context and the statuses it hands out.
pub struct ResourceTransactionManager {
    resource: Arc<dyn ResourceManager>,
    validate_existing: bool,
}

impl ResourceTransactionManager {
    /// Create a manager over the given resource manager
    pub fn new(resource: Arc<dyn ResourceManager>) -> Self {
        Self {
            resource,
            validate_existing: false,
        }
    }

    /// Reject participation in an existing transaction when the
    /// definition asks for an incompatible isolation level or read-only
    /// mode, instead of logging and ignoring the mismatch
    pub fn with_validate_existing(mut self, validate: bool) -> Self {
        self.validate_existing = validate;
        self
    }

    fn start_new(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
        suspended: Option<SuspendedResources>,
    ) -> Result<TransactionStatus> {
        match self.begin_resource(definition) {
            Ok(transaction) => {
                ctx.set_current(Arc::clone(&transaction));
                Ok(TransactionStatus::new_transaction(transaction, suspended))
            }
            Err(err) => {
                // A failed begin must leave no status active; put the
                // suspended outer transaction back before surfacing it.
                if let Some(suspended) = suspended {
                    if let Err(resume_err) = ctx.resume(suspended) {
                        error!("Failed to resume transaction after begin failure: {resume_err}");
                    }
                }
                Err(err)
            }
        }
    }

    fn begin_resource(&self, definition: &TransactionDefinition) -> Result<Arc<SharedTransaction>> {
        match definition.name() {
            Some(name) => debug!("Creating new transaction [{name}]"),
            None => debug!("Creating new transaction"),
        }
        let handle = self
            .resource
            .begin(
                definition.isolation_level(),
                definition.is_read_only(),
                definition.timeout_value(),
            )
            .map_err(|err| TransactionError::system("begin", err))?;
        Ok(Arc::new(SharedTransaction::new(
            handle,
            definition.isolation_level(),
            definition.is_read_only(),
            definition.name().map(str::to_string),
        )))
    }

    fn handle_existing(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
        existing: Arc<SharedTransaction>,
    ) -> Result<TransactionStatus> {
        match definition.propagation() {
            Propagation::Never => Err(TransactionError::IllegalState(
                "existing transaction found for propagation NEVER".to_string(),
            )),
            Propagation::NotSupported => {
                debug!("Suspending current transaction");
                let suspended = ctx.suspend()?;
                Ok(TransactionStatus::non_transactional(Some(suspended)))
            }
            Propagation::RequiresNew => {
                debug!("Suspending current transaction, starting new transaction");
                let suspended = ctx.suspend()?;
                self.start_new(ctx, definition, Some(suspended))
            }
            Propagation::Nested => {
                if self.resource.supports_savepoints() {
                    debug!("Creating nested transaction via savepoint");
                    let savepoint = self
                        .resource
                        .create_savepoint(&existing.handle())
                        .map_err(|err| TransactionError::system("create savepoint", err))?;
                    Ok(TransactionStatus::savepoint_scoped(existing, savepoint))
                } else {
                    // no savepoint capability: nest by suspending and
                    // starting a separate resource transaction
                    debug!("Resource manager lacks savepoints, nesting via new transaction");
                    let suspended = ctx.suspend()?;
                    self.start_new(ctx, definition, Some(suspended))
                }
            }
            Propagation::Required | Propagation::Supports | Propagation::Mandatory => {
                self.check_participation(definition, &existing)?;
                debug!("Participating in existing transaction");
                Ok(TransactionStatus::participating(existing))
            }
        }
    }

    fn check_participation(
        &self,
        definition: &TransactionDefinition,
        existing: &SharedTransaction,
    ) -> Result<()> {
        let requested = definition.isolation_level();
        if requested != Isolation::Default && requested != existing.isolation() {
            if self.validate_existing {
                return Err(TransactionError::IllegalState(format!(
                    "participating transaction requested isolation {} but existing transaction runs at {}",
                    requested,
                    existing.isolation()
                )));
            }
            warn!(
                "Participating in existing transaction at isolation {} although {} was requested",
                existing.isolation(),
                requested
            );
        }
        if self.validate_existing && existing.is_read_only() && !definition.is_read_only() {
            return Err(TransactionError::IllegalState(
                "participating transaction is not marked read-only but existing transaction is"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn process_commit(&self, ctx: &mut TransactionContext, status: &TransactionStatus) -> Result<()> {
        match (status.savepoint(), status.shared(), status.is_new_transaction()) {
            (Some(savepoint), Some(transaction), _) => {
                debug!("Releasing transaction savepoint");
                self.resource
                    .release_savepoint(&transaction.handle(), savepoint)
                    .map_err(|err| TransactionError::system("release savepoint", err))
            }
            (None, Some(transaction), true) => self.commit_new(ctx, &transaction),
            // Joined or non-transactional: the actual commit, if any,
            // belongs to the owning status.
            _ => Ok(()),
        }
    }

    fn commit_new(&self, ctx: &mut TransactionContext, transaction: &Arc<SharedTransaction>) -> Result<()> {
        if let Some(name) = transaction.name() {
            debug!("Committing transaction [{name}]");
        }
        let mut synchronizations = transaction.take_synchronizations();

        for sync in synchronizations.iter_mut() {
            if let Err(err) = sync.before_commit(transaction.is_read_only()) {
                debug!("Before-commit synchronization failed, rolling back: {err}");
                let rollback_result = self.resource.rollback(&transaction.handle());
                let outcome = if rollback_result.is_ok() {
                    CompletionStatus::RolledBack
                } else {
                    CompletionStatus::Unknown
                };
                Self::fire_after_completion(&mut synchronizations, outcome);
                self.detach(ctx, transaction);
                return match rollback_result {
                    Ok(()) => Err(TransactionError::Synchronization(err.to_string())),
                    Err(rollback_err) => Err(TransactionError::system("rollback", rollback_err)
                        .with_application_cause(Box::new(err))),
                };
            }
        }

        match self.resource.commit(&transaction.handle()) {
            Ok(()) => {
                for sync in synchronizations.iter_mut() {
                    sync.after_commit();
                }
                Self::fire_after_completion(&mut synchronizations, CompletionStatus::Committed);
                self.detach(ctx, transaction);
                Ok(())
            }
            Err(err) => {
                Self::fire_after_completion(&mut synchronizations, CompletionStatus::Unknown);
                self.detach(ctx, transaction);
                Err(TransactionError::system("commit", err))
            }
        }
    }

    fn process_rollback(
        &self,
        ctx: &mut TransactionContext,
        status: &TransactionStatus,
    ) -> Result<()> {
        match (status.savepoint(), status.shared(), status.is_new_transaction()) {
            (Some(savepoint), Some(transaction), _) => {
                debug!("Rolling back transaction to savepoint");
                self.resource
                    .rollback_to_savepoint(&transaction.handle(), savepoint)
                    .map_err(|err| TransactionError::system("rollback to savepoint", err))?;
                self.resource
                    .release_savepoint(&transaction.handle(), savepoint)
                    .map_err(|err| TransactionError::system("release savepoint", err))
            }
            (None, Some(transaction), true) => {
                debug!("Initiating transaction rollback");
                let mut synchronizations = transaction.take_synchronizations();
                let rollback_result = self.resource.rollback(&transaction.handle());
                let outcome = if rollback_result.is_ok() {
                    CompletionStatus::RolledBack
                } else {
                    CompletionStatus::Unknown
                };
                Self::fire_after_completion(&mut synchronizations, outcome);
                self.detach(ctx, &transaction);
                rollback_result.map_err(|err| TransactionError::system("rollback", err))
            }
            (None, Some(transaction), false) => {
                // Participating: never roll back the shared resource
                // transaction here, poison the owning commit instead.
                debug!("Participating transaction failed, marking existing transaction rollback-only");
                transaction.set_rollback_only();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Finalize a status: mark it completed and resume any suspended
    /// outer transaction. Resumption always runs, whatever the outcome
    /// of the commit or rollback work.
    fn complete(
        &self,
        ctx: &mut TransactionContext,
        status: &mut TransactionStatus,
        outcome: Result<()>,
    ) -> Result<()> {
        status.mark_completed();
        if let Some(suspended) = status.take_suspended() {
            debug!("Resuming suspended transaction");
            if let Err(resume_err) = ctx.resume(suspended) {
                if outcome.is_ok() {
                    return Err(resume_err);
                }
                error!("Failed to resume suspended transaction: {resume_err}");
            }
        }
        outcome
    }

    fn detach(&self, ctx: &mut TransactionContext, transaction: &Arc<SharedTransaction>) {
        debug_assert!(
            ctx.current()
                .is_some_and(|current| Arc::ptr_eq(current, transaction)),
            "completing a transaction that is not current in this context"
        );
        ctx.clear_current();
    }

    fn fire_after_completion(
        synchronizations: &mut [Box<dyn TransactionSynchronization>],
        outcome: CompletionStatus,
    ) {
        for sync in synchronizations.iter_mut() {
            sync.after_completion(outcome);
        }
    }
}

impl PlatformTransactionManager for ResourceTransactionManager {
    fn get_transaction(
        &self,
        ctx: &mut TransactionContext,
        definition: &TransactionDefinition,
    ) -> Result<TransactionStatus> {
        if let Some(existing) = ctx.current().cloned() {
            return self.handle_existing(ctx, definition, existing);
        }

        match definition.propagation() {
            Propagation::Mandatory => Err(TransactionError::IllegalState(
                "no existing transaction found for propagation MANDATORY".to_string(),
            )),
            Propagation::Required | Propagation::RequiresNew | Propagation::Nested => {
                self.start_new(ctx, definition, None)
            }
            Propagation::Supports | Propagation::NotSupported | Propagation::Never => {
                Ok(TransactionStatus::non_transactional(None))
            }
        }
    }

    fn commit(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::IllegalState(
                "transaction already completed - commit or rollback may only be called once"
                    .to_string(),
            ));
        }

        let outcome = if status.is_rollback_only() {
            debug!("Commit converted to rollback: transaction was marked rollback-only");
            self.process_rollback(ctx, status)
                .and(Err(TransactionError::UnexpectedRollback))
        } else {
            self.process_commit(ctx, status)
        };
        self.complete(ctx, status, outcome)
    }

    fn rollback(&self, ctx: &mut TransactionContext, status: &mut TransactionStatus) -> Result<()> {
        if status.is_completed() {
            return Err(TransactionError::IllegalState(
                "transaction already completed - commit or rollback may only be called once"
                    .to_string(),
            ));
        }

        let outcome = self.process_rollback(ctx, status);
        self.complete(ctx, status, outcome)
    }
}
