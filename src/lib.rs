// txflow - declarative transaction propagation engine

pub mod common;
pub mod context;
pub mod definition;
pub mod manager;
pub mod resource;
pub mod sync;
pub mod template;

// Re-export key items for convenient access
pub use context::{SuspendedResources, TransactionContext};
pub use definition::{DefinitionError, Isolation, Propagation, Timeout, TransactionDefinition};
pub use manager::{
    PlatformTransactionManager, ResourceTransactionManager, TransactionError, TransactionStatus,
};
pub use resource::{
    InMemoryResourceManager, ResourceError, ResourceEvent, ResourceHandle, ResourceManager,
    Savepoint,
};
pub use sync::{CompletionStatus, SynchronizationError, TransactionSynchronization};
pub use template::{RollbackRule, TemplateError, TransactionOperations, TransactionTemplate};
