#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use txflow::definition::{Isolation, Timeout};
use txflow::manager::ResourceTransactionManager;
use txflow::resource::{
    InMemoryResourceManager, ResourceError, ResourceHandle, ResourceManager, Savepoint,
};
use txflow::sync::{CompletionStatus, SynchronizationError, TransactionSynchronization};

// Create a manager over a fresh in-memory resource manager
pub fn manager_fixture() -> (Arc<ResourceTransactionManager>, Arc<InMemoryResourceManager>) {
    let resource = Arc::new(InMemoryResourceManager::new());
    let manager = Arc::new(ResourceTransactionManager::new(
        Arc::clone(&resource) as Arc<dyn ResourceManager>
    ));
    (manager, resource)
}

// Create a manager whose resource manager reports no savepoint support
pub fn no_savepoint_fixture() -> (Arc<ResourceTransactionManager>, Arc<InMemoryResourceManager>) {
    let resource = Arc::new(InMemoryResourceManager::without_savepoints());
    let manager = Arc::new(ResourceTransactionManager::new(
        Arc::clone(&resource) as Arc<dyn ResourceManager>
    ));
    (manager, resource)
}

// Create a manager with switchable resource-level fault injection
pub fn faulty_fixture() -> (
    Arc<ResourceTransactionManager>,
    Arc<FaultInjectingResourceManager>,
    Arc<InMemoryResourceManager>,
) {
    let inner = Arc::new(InMemoryResourceManager::new());
    let faulty = Arc::new(FaultInjectingResourceManager::new(Arc::clone(&inner)));
    let manager = Arc::new(ResourceTransactionManager::new(
        Arc::clone(&faulty) as Arc<dyn ResourceManager>
    ));
    (manager, faulty, inner)
}

/// Resource manager wrapper that fails selected operations on demand
pub struct FaultInjectingResourceManager {
    inner: Arc<InMemoryResourceManager>,
    fail_begin: AtomicBool,
    fail_commit: AtomicBool,
    fail_rollback: AtomicBool,
}

impl FaultInjectingResourceManager {
    pub fn new(inner: Arc<InMemoryResourceManager>) -> Self {
        Self {
            inner,
            fail_begin: AtomicBool::new(false),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
        }
    }

    pub fn fail_begin(&self, fail: bool) {
        self.fail_begin.store(fail, Ordering::SeqCst);
    }

    pub fn fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.fail_rollback.store(fail, Ordering::SeqCst);
    }
}

impl ResourceManager for FaultInjectingResourceManager {
    fn begin(
        &self,
        isolation: Isolation,
        read_only: bool,
        timeout: Timeout,
    ) -> Result<ResourceHandle, ResourceError> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(ResourceError::Failure("injected begin failure".to_string()));
        }
        self.inner.begin(isolation, read_only, timeout)
    }

    fn commit(&self, handle: &ResourceHandle) -> Result<(), ResourceError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(ResourceError::Failure("injected commit failure".to_string()));
        }
        self.inner.commit(handle)
    }

    fn rollback(&self, handle: &ResourceHandle) -> Result<(), ResourceError> {
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(ResourceError::Failure(
                "injected rollback failure".to_string(),
            ));
        }
        self.inner.rollback(handle)
    }

    fn create_savepoint(&self, handle: &ResourceHandle) -> Result<Savepoint, ResourceError> {
        self.inner.create_savepoint(handle)
    }

    fn rollback_to_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError> {
        self.inner.rollback_to_savepoint(handle, savepoint)
    }

    fn release_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError> {
        self.inner.release_savepoint(handle, savepoint)
    }

    fn supports_savepoints(&self) -> bool {
        self.inner.supports_savepoints()
    }
}

pub type CallbackLog = Arc<Mutex<Vec<String>>>;

pub fn new_callback_log() -> CallbackLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Synchronization that records every callback it receives
pub struct RecordingSynchronization {
    name: &'static str,
    log: CallbackLog,
    fail_before_commit: bool,
}

impl RecordingSynchronization {
    pub fn new(name: &'static str, log: CallbackLog) -> Self {
        Self {
            name,
            log,
            fail_before_commit: false,
        }
    }

    /// Recording synchronization whose before-commit callback fails
    pub fn failing(name: &'static str, log: CallbackLog) -> Self {
        Self {
            name,
            log,
            fail_before_commit: true,
        }
    }
}

impl TransactionSynchronization for RecordingSynchronization {
    fn before_commit(&mut self, read_only: bool) -> Result<(), SynchronizationError> {
        self.log
            .lock()
            .push(format!("before_commit:{}:{}", self.name, read_only));
        if self.fail_before_commit {
            return Err(SynchronizationError::new("rejected by before-commit"));
        }
        Ok(())
    }

    fn after_commit(&mut self) {
        self.log.lock().push(format!("after_commit:{}", self.name));
    }

    fn after_completion(&mut self, status: CompletionStatus) {
        self.log
            .lock()
            .push(format!("after_completion:{}:{:?}", self.name, status));
    }
}
