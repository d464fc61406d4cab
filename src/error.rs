//! Typed errors returned by the core operations.
//!
//! Every core function fails with a [`CoreError`]; the web layer maps each
//! variant to an HTTP status in one place. `Inconsistent` is the fatal case:
//! a dual-record relationship update committed its first write but could not
//! complete its second. It is surfaced, never retried, because a blind retry
//! risks duplicate side effects; repair is the reconciler's job.

use crate::storage::StorageError;

#[derive(Debug)]
pub enum CoreError {
    /// A referenced user, group, or message does not exist.
    NotFound(String),
    /// The requested transition is invalid in the current state
    /// (duplicate pending request, self-request, malformed addressing).
    Conflict(String),
    /// The actor lacks rights over the referenced entity.
    Unauthorized(String),
    /// A dual-record update completed its first step but failed its second.
    /// The relationship pair is now asymmetric until reconciled.
    Inconsistent(String),
    /// Underlying storage failure before any write took effect.
    Storage(StorageError),
}

impl CoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        CoreError::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        CoreError::Conflict(what.into())
    }

    pub fn unauthorized(what: impl Into<String>) -> Self {
        CoreError::Unauthorized(what.into())
    }
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::NotFound(msg) => write!(f, "not found: {msg}"),
            CoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            CoreError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            CoreError::Inconsistent(msg) => write!(f, "inconsistent state: {msg}"),
            CoreError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<StorageError> for CoreError {
    fn from(e: StorageError) -> Self {
        CoreError::Storage(e)
    }
}
