// Transaction definition model
// Immutable configuration describing how a unit of work participates in
// a transactional context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building definitions from configuration values
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("unknown propagation behavior: {0}")]
    UnknownPropagation(String),

    #[error("unknown isolation level: {0}")]
    UnknownIsolation(String),

    #[error("invalid transaction timeout: {0}")]
    InvalidTimeout(i64),
}

/// Propagation behavior - governs whether a unit of work joins, starts,
/// or rejects participation in a transaction already active in its call
/// chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the current transaction; start a new one if none exists
    Required,
    /// Join the current transaction; run non-transactionally if none exists
    Supports,
    /// Join the current transaction; fail if none exists
    Mandatory,
    /// Always start a new transaction, suspending the current one if present
    RequiresNew,
    /// Run non-transactionally, suspending the current transaction if present
    NotSupported,
    /// Run non-transactionally; fail if a transaction is active
    Never,
    /// Run within a savepoint of the current transaction if one exists,
    /// otherwise start a new transaction
    Nested,
}

impl Propagation {
    /// Constant name of this propagation behavior
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::Supports => "SUPPORTS",
            Propagation::Mandatory => "MANDATORY",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::NotSupported => "NOT_SUPPORTED",
            Propagation::Never => "NEVER",
            Propagation::Nested => "NESTED",
        }
    }
}

impl FromStr for Propagation {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUIRED" => Ok(Propagation::Required),
            "SUPPORTS" => Ok(Propagation::Supports),
            "MANDATORY" => Ok(Propagation::Mandatory),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            "NOT_SUPPORTED" => Ok(Propagation::NotSupported),
            "NEVER" => Ok(Propagation::Never),
            "NESTED" => Ok(Propagation::Nested),
            other => Err(DefinitionError::UnknownPropagation(other.to_string())),
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Isolation level requested from the resource manager when a new
/// transaction begins. Only meaningful when propagation actually starts
/// a new resource transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Isolation {
    /// Use the resource manager's own default
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl Isolation {
    /// Constant name of this isolation level
    pub fn as_str(&self) -> &'static str {
        match self {
            Isolation::Default => "DEFAULT",
            Isolation::ReadUncommitted => "READ_UNCOMMITTED",
            Isolation::ReadCommitted => "READ_COMMITTED",
            Isolation::RepeatableRead => "REPEATABLE_READ",
            Isolation::Serializable => "SERIALIZABLE",
        }
    }
}

impl FromStr for Isolation {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFAULT" => Ok(Isolation::Default),
            "READ_UNCOMMITTED" => Ok(Isolation::ReadUncommitted),
            "READ_COMMITTED" => Ok(Isolation::ReadCommitted),
            "REPEATABLE_READ" => Ok(Isolation::RepeatableRead),
            "SERIALIZABLE" => Ok(Isolation::Serializable),
            other => Err(DefinitionError::UnknownIsolation(other.to_string())),
        }
    }
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction timeout. Applies only to newly started transactions and
/// is enforced by the resource manager. In configuration the default is
/// written as -1; any other value is a number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Timeout {
    /// Use the resource manager's default timeout, if any
    Default,
    /// Timeout after the given number of seconds
    Seconds(u32),
}

impl Timeout {
    pub fn seconds(secs: u32) -> Self {
        Timeout::Seconds(secs)
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Timeout::Default)
    }
}

impl TryFrom<i64> for Timeout {
    type Error = DefinitionError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        match raw {
            -1 => Ok(Timeout::Default),
            secs if (0..=i64::from(u32::MAX)).contains(&secs) => Ok(Timeout::Seconds(secs as u32)),
            other => Err(DefinitionError::InvalidTimeout(other)),
        }
    }
}

impl From<Timeout> for i64 {
    fn from(timeout: Timeout) -> i64 {
        match timeout {
            Timeout::Default => -1,
            Timeout::Seconds(secs) => i64::from(secs),
        }
    }
}

/// Immutable description of how a unit of work should be executed
/// transactionally: propagation behavior, isolation level, timeout,
/// read-only hint and an optional diagnostic name.
///
/// Isolation and timeout are inert unless the propagation behavior
/// causes a brand-new resource transaction to be started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionDefinition {
    propagation: Propagation,
    isolation: Isolation,
    timeout: Timeout,
    read_only: bool,
    name: Option<String>,
}

impl Default for TransactionDefinition {
    fn default() -> Self {
        Self {
            propagation: Propagation::Required,
            isolation: Isolation::Default,
            timeout: Timeout::Default,
            read_only: false,
            name: None,
        }
    }
}

impl TransactionDefinition {
    /// Create a definition with the documented defaults: REQUIRED
    /// propagation, DEFAULT isolation, DEFAULT timeout, not read-only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a definition with the given propagation behavior and
    /// defaults for everything else
    pub fn with_propagation(propagation: Propagation) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    pub fn isolation(mut self, isolation: Isolation) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Propagation behavior of this definition
    pub fn propagation(&self) -> Propagation {
        self.propagation
    }

    /// Isolation level requested for newly started transactions
    pub fn isolation_level(&self) -> Isolation {
        self.isolation
    }

    /// Timeout applied to newly started transactions
    pub fn timeout_value(&self) -> Timeout {
        self.timeout
    }

    /// Whether the transaction should be optimized as read-only. This is
    /// a hint; write operations are never rejected because of it.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Diagnostic name, if one was set
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
