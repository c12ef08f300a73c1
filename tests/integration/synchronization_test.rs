// Synchronization registry tests
// Callbacks fire in registration order at the lifecycle points of the
// owning new-transaction lifecycle, and after-completion fires exactly
// once with the real outcome.

use txflow::definition::{Propagation, TransactionDefinition};
use txflow::manager::{PlatformTransactionManager, TransactionError};
use txflow::resource::ResourceEvent;
use txflow::template::{TemplateError, TransactionOperations, TransactionTemplate};
use txflow::TransactionContext;

use thiserror::Error;

#[path = "../common/mod.rs"]
mod common;
use common::{faulty_fixture, manager_fixture, new_callback_log, RecordingSynchronization};

#[derive(Error, Debug)]
#[error("work failed")]
struct WorkFailed;

#[test]
fn test_callbacks_fire_in_registration_order_on_commit() {
    let (manager, _resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut status = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("a", log.clone())))
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("b", log.clone())))
        .unwrap();

    manager.commit(&mut ctx, &mut status).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "before_commit:a:false",
            "before_commit:b:false",
            "after_commit:a",
            "after_commit:b",
            "after_completion:a:Committed",
            "after_completion:b:Committed",
        ]
    );
}

#[test]
fn test_explicit_rollback_fires_rolled_back_only() {
    let (manager, _resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut status = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("a", log.clone())))
        .unwrap();

    manager.rollback(&mut ctx, &mut status).unwrap();
    assert_eq!(*log.lock(), vec!["after_completion:a:RolledBack"]);
}

#[test]
fn test_rollback_only_commit_fires_rolled_back_exactly_once() {
    let (manager, _resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut status = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("a", log.clone())))
        .unwrap();

    status.set_rollback_only();
    let err = manager.commit(&mut ctx, &mut status).unwrap_err();
    assert!(matches!(err, TransactionError::UnexpectedRollback));
    assert_eq!(*log.lock(), vec!["after_completion:a:RolledBack"]);
}

#[test]
fn test_commit_failure_fires_unknown() {
    let (manager, faulty, _inner) = faulty_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut status = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("a", log.clone())))
        .unwrap();

    faulty.fail_commit(true);
    let err = manager.commit(&mut ctx, &mut status).unwrap_err();
    assert!(matches!(err, TransactionError::System { .. }));
    assert_eq!(
        *log.lock(),
        vec!["before_commit:a:false", "after_completion:a:Unknown"]
    );
}

#[test]
fn test_before_commit_failure_forces_rollback() {
    let (manager, resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut status = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::failing("a", log.clone())))
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("b", log.clone())))
        .unwrap();

    let err = manager.commit(&mut ctx, &mut status).unwrap_err();
    assert!(matches!(err, TransactionError::Synchronization(_)));
    assert_eq!(
        resource.events(),
        vec![ResourceEvent::Begin(1), ResourceEvent::RolledBack(1)]
    );
    // the failing callback stops the before-commit chain; completion
    // still reaches every registration
    assert_eq!(
        *log.lock(),
        vec![
            "before_commit:a:false",
            "after_completion:a:RolledBack",
            "after_completion:b:RolledBack",
        ]
    );
}

#[test]
fn test_participant_registrations_fire_at_owning_commit() {
    let (manager, _resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let mut outer = manager
        .get_transaction(&mut ctx, &TransactionDefinition::new())
        .unwrap();
    let mut inner = manager
        .get_transaction(
            &mut ctx,
            &TransactionDefinition::with_propagation(Propagation::Required),
        )
        .unwrap();
    ctx.register_synchronization(Box::new(RecordingSynchronization::new(
        "inner",
        log.clone(),
    )))
    .unwrap();

    // inner commit is not the owning completion; nothing fires yet
    manager.commit(&mut ctx, &mut inner).unwrap();
    assert!(log.lock().is_empty());

    manager.commit(&mut ctx, &mut outer).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "before_commit:inner:false",
            "after_commit:inner",
            "after_completion:inner:Committed",
        ]
    );
}

#[test]
fn test_read_only_hint_reaches_before_commit() {
    let (manager, resource) = manager_fixture();
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let definition = TransactionDefinition::new().read_only(true);
    let mut status = manager.get_transaction(&mut ctx, &definition).unwrap();
    assert_eq!(
        resource.read_only_of(&txflow::ResourceHandle::new(1)),
        Some(true)
    );
    ctx.register_synchronization(Box::new(RecordingSynchronization::new("a", log.clone())))
        .unwrap();

    manager.commit(&mut ctx, &mut status).unwrap();
    assert_eq!(
        *log.lock(),
        vec![
            "before_commit:a:true",
            "after_commit:a",
            "after_completion:a:Committed",
        ]
    );
}

#[test]
fn test_failing_work_in_template_fires_rolled_back_once() {
    let (manager, _resource) = manager_fixture();
    let template = TransactionTemplate::new(manager);
    let mut ctx = TransactionContext::new();
    let log = new_callback_log();

    let err = template
        .execute::<(), WorkFailed, _>(&mut ctx, |ctx, _status| {
            ctx.register_synchronization(Box::new(RecordingSynchronization::new(
                "a",
                log.clone(),
            )))
            .map_err(|_| WorkFailed)?;
            Err(WorkFailed)
        })
        .unwrap_err();
    assert!(matches!(err, TemplateError::Work(WorkFailed)));
    assert_eq!(*log.lock(), vec!["after_completion:a:RolledBack"]);
}
