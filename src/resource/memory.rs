// In-memory resource manager
// Reference backend: keeps transaction and savepoint state in memory and
// records every resource-level operation in order, so callers can verify
// exactly which begin/commit/rollback/savepoint calls were made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::common::types::{ResourceId, SavepointId};
use crate::definition::{Isolation, Timeout};
use crate::resource::{ResourceError, ResourceHandle, ResourceManager, Savepoint};

/// One resource-level operation, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceEvent {
    Begin(ResourceId),
    Committed(ResourceId),
    RolledBack(ResourceId),
    SavepointCreated(ResourceId, SavepointId),
    RolledBackToSavepoint(ResourceId, SavepointId),
    SavepointReleased(ResourceId, SavepointId),
}

/// State of one active in-memory transaction
#[derive(Debug)]
struct ActiveTransaction {
    isolation: Isolation,
    read_only: bool,
    timeout: Timeout,
    savepoints: Vec<SavepointId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    active: HashMap<ResourceId, ActiveTransaction>,
    events: Vec<ResourceEvent>,
}

/// Resource manager holding all transaction state in memory
pub struct InMemoryResourceManager {
    savepoints_supported: bool,
    next_handle: AtomicU64,
    next_savepoint: AtomicU64,
    state: Mutex<MemoryState>,
}

impl InMemoryResourceManager {
    /// Create a new in-memory resource manager with savepoint support
    pub fn new() -> Self {
        Self {
            savepoints_supported: true,
            next_handle: AtomicU64::new(1),
            next_savepoint: AtomicU64::new(1),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Create a manager that reports no savepoint capability
    pub fn without_savepoints() -> Self {
        Self {
            savepoints_supported: false,
            ..Self::new()
        }
    }

    /// Snapshot of every resource-level event so far, in order
    pub fn events(&self) -> Vec<ResourceEvent> {
        self.state.lock().events.clone()
    }

    /// Number of transactions currently active
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Isolation level an active transaction was begun with
    pub fn isolation_of(&self, handle: &ResourceHandle) -> Option<Isolation> {
        self.state
            .lock()
            .active
            .get(&handle.id())
            .map(|txn| txn.isolation)
    }

    /// Timeout an active transaction was begun with
    pub fn timeout_of(&self, handle: &ResourceHandle) -> Option<Timeout> {
        self.state
            .lock()
            .active
            .get(&handle.id())
            .map(|txn| txn.timeout)
    }

    /// Read-only hint an active transaction was begun with
    pub fn read_only_of(&self, handle: &ResourceHandle) -> Option<bool> {
        self.state
            .lock()
            .active
            .get(&handle.id())
            .map(|txn| txn.read_only)
    }
}

impl Default for InMemoryResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager for InMemoryResourceManager {
    fn begin(
        &self,
        isolation: Isolation,
        read_only: bool,
        timeout: Timeout,
    ) -> Result<ResourceHandle, ResourceError> {
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.active.insert(
            id,
            ActiveTransaction {
                isolation,
                read_only,
                timeout,
                savepoints: Vec::new(),
            },
        );
        state.events.push(ResourceEvent::Begin(id));
        Ok(ResourceHandle::new(id))
    }

    fn commit(&self, handle: &ResourceHandle) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if state.active.remove(&handle.id()).is_none() {
            return Err(ResourceError::UnknownHandle(handle.id()));
        }
        state.events.push(ResourceEvent::Committed(handle.id()));
        Ok(())
    }

    fn rollback(&self, handle: &ResourceHandle) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        if state.active.remove(&handle.id()).is_none() {
            return Err(ResourceError::UnknownHandle(handle.id()));
        }
        state.events.push(ResourceEvent::RolledBack(handle.id()));
        Ok(())
    }

    fn create_savepoint(&self, handle: &ResourceHandle) -> Result<Savepoint, ResourceError> {
        if !self.savepoints_supported {
            return Err(ResourceError::SavepointsUnsupported);
        }
        let savepoint_id = self.next_savepoint.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        let txn = state
            .active
            .get_mut(&handle.id())
            .ok_or(ResourceError::UnknownHandle(handle.id()))?;
        txn.savepoints.push(savepoint_id);
        state
            .events
            .push(ResourceEvent::SavepointCreated(handle.id(), savepoint_id));
        Ok(Savepoint::new(savepoint_id))
    }

    fn rollback_to_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let txn = state
            .active
            .get_mut(&handle.id())
            .ok_or(ResourceError::UnknownHandle(handle.id()))?;
        let position = txn
            .savepoints
            .iter()
            .position(|&id| id == savepoint.id())
            .ok_or(ResourceError::UnknownSavepoint(savepoint.id()))?;
        // Rolling back to a savepoint invalidates every later savepoint
        txn.savepoints.truncate(position + 1);
        state.events.push(ResourceEvent::RolledBackToSavepoint(
            handle.id(),
            savepoint.id(),
        ));
        Ok(())
    }

    fn release_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError> {
        let mut state = self.state.lock();
        let txn = state
            .active
            .get_mut(&handle.id())
            .ok_or(ResourceError::UnknownHandle(handle.id()))?;
        let position = txn
            .savepoints
            .iter()
            .position(|&id| id == savepoint.id())
            .ok_or(ResourceError::UnknownSavepoint(savepoint.id()))?;
        txn.savepoints.remove(position);
        state
            .events
            .push(ResourceEvent::SavepointReleased(handle.id(), savepoint.id()));
        Ok(())
    }

    fn supports_savepoints(&self) -> bool {
        self.savepoints_supported
    }
}
