/// Resource transaction identifier type
pub type ResourceId = u64;

/// Savepoint identifier type
pub type SavepointId = u64;
