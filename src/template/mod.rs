// Transaction template
// Executes a caller-supplied unit of work inside a transaction obtained
// from the manager, converting errors into rollback decisions and
// re-raising them to the caller.

use std::sync::Arc;

use log::{debug, error};
use thiserror::Error;

use crate::context::TransactionContext;
use crate::definition::TransactionDefinition;
use crate::manager::{PlatformTransactionManager, TransactionError, TransactionStatus};

/// Error surface of template execution
#[derive(Error, Debug)]
pub enum TemplateError<E: std::error::Error> {
    /// The unit of work failed with an error from the declared
    /// rollback-triggering set; the transaction was rolled back and the
    /// original error is re-raised unchanged
    #[error(transparent)]
    Work(E),

    /// The unit of work failed with an error outside the declared
    /// rollback-triggering set; the transaction was still rolled back
    #[error("transaction callback raised an undeclared failure: {0}")]
    Undeclared(E),

    /// Transaction management itself failed (begin, commit, rollback,
    /// or an unexpected rollback-only conversion)
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Which unit-of-work errors belong to the declared rollback-triggering
/// set. Errors outside the set still roll the transaction back but are
/// re-signaled as undeclared failures.
#[derive(Clone, Copy, Default)]
pub enum RollbackRule {
    /// Every error triggers rollback and is re-raised unchanged
    #[default]
    All,
    /// Only errors matching the predicate are declared
    DeclaredOnly(fn(&(dyn std::error::Error + 'static)) -> bool),
}

impl RollbackRule {
    fn declares(&self, err: &(dyn std::error::Error + 'static)) -> bool {
        match self {
            RollbackRule::All => true,
            RollbackRule::DeclaredOnly(predicate) => predicate(err),
        }
    }
}

/// Basic transaction execution operations.
///
/// The status-based strategy is covered by wrapping a
/// `PlatformTransactionManager` in a `TransactionTemplate`; a manager
/// that prefers to drive the unit of work itself implements this trait
/// directly. Either way the choice is made once, at construction.
pub trait TransactionOperations {
    /// Execute the unit of work within a transaction, committing on
    /// success and rolling back on error
    fn execute<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        work: F,
    ) -> Result<T, TemplateError<E>>
    where
        F: FnOnce(&mut TransactionContext, &mut TransactionStatus) -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static;
}

/// Template wrapping a unit of work in begin/commit/rollback semantics.
///
/// Holds no transactional state of its own beyond the definition it
/// executes under; all side effects go through the manager.
pub struct TransactionTemplate<M> {
    manager: Arc<M>,
    definition: TransactionDefinition,
    rollback_rule: RollbackRule,
}

impl<M: PlatformTransactionManager> TransactionTemplate<M> {
    /// Create a template executing under the default definition
    pub fn new(manager: Arc<M>) -> Self {
        Self::with_definition(manager, TransactionDefinition::new())
    }

    /// Create a template executing under the given definition
    pub fn with_definition(manager: Arc<M>, definition: TransactionDefinition) -> Self {
        Self {
            manager,
            definition,
            rollback_rule: RollbackRule::All,
        }
    }

    pub fn rollback_rule(mut self, rule: RollbackRule) -> Self {
        self.rollback_rule = rule;
        self
    }

    /// The definition this template executes under
    pub fn definition(&self) -> &TransactionDefinition {
        &self.definition
    }

    fn rollback_on_error<E>(
        &self,
        ctx: &mut TransactionContext,
        status: &mut TransactionStatus,
        err: E,
    ) -> TemplateError<E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        debug!("Initiating transaction rollback on application error");
        if let Err(rollback_err) = self.manager.rollback(ctx, status) {
            // The rollback failure takes precedence; the application
            // error travels along as its cause.
            error!("Application error overridden by rollback failure: {rollback_err}");
            return TemplateError::Transaction(rollback_err.with_application_cause(Box::new(err)));
        }
        if self.rollback_rule.declares(&err) {
            TemplateError::Work(err)
        } else {
            TemplateError::Undeclared(err)
        }
    }
}

impl<M: PlatformTransactionManager> TransactionOperations for TransactionTemplate<M> {
    fn execute<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        work: F,
    ) -> Result<T, TemplateError<E>>
    where
        F: FnOnce(&mut TransactionContext, &mut TransactionStatus) -> Result<T, E>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut status = self
            .manager
            .get_transaction(ctx, &self.definition)
            .map_err(TemplateError::Transaction)?;

        match work(ctx, &mut status) {
            Ok(value) => {
                self.manager.commit(ctx, &mut status)?;
                Ok(value)
            }
            Err(err) => Err(self.rollback_on_error(ctx, &mut status, err)),
        }
    }
}
