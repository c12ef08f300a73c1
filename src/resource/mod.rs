// Resource manager abstraction
// The engine never talks to a concrete storage technology; every
// resource-level operation goes through this trait.

pub mod memory;

use thiserror::Error;

use crate::common::types::{ResourceId, SavepointId};
use crate::definition::{Isolation, Timeout};

pub use memory::{InMemoryResourceManager, ResourceEvent};

/// Errors raised by a resource manager collaborator
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("unknown resource transaction handle {0}")]
    UnknownHandle(ResourceId),

    #[error("unknown savepoint {0}")]
    UnknownSavepoint(SavepointId),

    #[error("savepoints are not supported by this resource manager")]
    SavepointsUnsupported,

    #[error("resource failure: {0}")]
    Failure(String),
}

/// Opaque handle to one resource-level transaction, issued by the
/// resource manager on begin and passed back for every later operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(ResourceId);

impl ResourceHandle {
    pub fn new(id: ResourceId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> ResourceId {
        self.0
    }
}

/// Opaque savepoint marker within a resource transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Savepoint(SavepointId);

impl Savepoint {
    pub fn new(id: SavepointId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> SavepointId {
        self.0
    }
}

/// Strategy for the actual resource-level transaction work. Implemented
/// by storage backends; the propagation engine is generic over it.
///
/// Begin receives the isolation level, read-only hint and timeout from
/// the definition that caused the new transaction; enforcement of all
/// three is the resource manager's business.
pub trait ResourceManager: Send + Sync {
    /// Start a new resource transaction and return its handle
    fn begin(
        &self,
        isolation: Isolation,
        read_only: bool,
        timeout: Timeout,
    ) -> Result<ResourceHandle, ResourceError>;

    /// Durably commit the resource transaction
    fn commit(&self, handle: &ResourceHandle) -> Result<(), ResourceError>;

    /// Roll back the resource transaction
    fn rollback(&self, handle: &ResourceHandle) -> Result<(), ResourceError>;

    /// Create a savepoint within an active resource transaction
    fn create_savepoint(&self, handle: &ResourceHandle) -> Result<Savepoint, ResourceError>;

    /// Roll back to the given savepoint, keeping the transaction active
    fn rollback_to_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError>;

    /// Release the given savepoint without rolling back
    fn release_savepoint(
        &self,
        handle: &ResourceHandle,
        savepoint: Savepoint,
    ) -> Result<(), ResourceError>;

    /// Whether this resource manager supports savepoints at all
    fn supports_savepoints(&self) -> bool;
}
