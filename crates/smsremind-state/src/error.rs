//! State error types.

use std::io;

use chrono::TimeDelta;
use thiserror::Error;

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing durable state.
#[derive(Debug, Error)]
pub enum StateError {
    /// IO error (lock or store file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The store file is not valid JSON.
    #[error("invalid store file: {0}")]
    Json(#[from] serde_json::Error),

    /// Another run holds a fresh lock.
    #[error("lock already held (pid={pid}, age={}s)", .age.num_seconds())]
    LockHeld { pid: u32, age: TimeDelta },

    /// The lock file exists but its content cannot be parsed.
    #[error("lock exists but is invalid: {message}")]
    InvalidLock { message: String },

    /// The stale lock was removed but creating a new one still failed.
    #[error("failed to acquire lock after removing stale lock: {path}")]
    StaleLockRetry { path: String },
}

impl StateError {
    /// Creates an invalid lock error.
    pub fn invalid_lock(message: impl Into<String>) -> Self {
        Self::InvalidLock {
            message: message.into(),
        }
    }

    /// Returns true if this error only means another run is active.
    pub fn is_lock_held(&self) -> bool {
        matches!(self, Self::LockHeld { .. })
    }
}
