//! Turn-based engine error hierarchy
//!
//! Errors are grouped by subsystem (storage, locking, optimistic concurrency,
//! events). Every variant maps onto one [`ErrorCode`] so callers receive the
//! same `code/message/details` triple regardless of where a failure started.

use std::fmt;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use serde_json::Value;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Versioned store failures (backend calls, codec)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Lease contention and ownership violations
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Optimistic concurrency failures
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Event shape violations
    #[error(transparent)]
    Event(#[from] EventError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The backend rejected or failed the call
    #[error("Store backend error: {0}")]
    Backend(String),

    /// Values are stored as JSON documents
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// A key holds a value of an unexpected shape
    #[error("Corrupted value at key {key}")]
    Corrupted { key: String },
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another holder owns an unexpired lease
    #[error("Game {game_id} is locked by {holder_id} for {operation} until {expires_at}")]
    Held {
        game_id: String,
        holder_id: String,
        operation: String,
        expires_at: u64,
    },

    /// Release attempted with a lease token that is not the stored one
    #[error("Lock {lock_id} on game {game_id} is not owned by caller (current: {current_lock_id})")]
    NotOwner {
        game_id: String,
        lock_id: String,
        current_lock_id: String,
    },

    /// The lease expired or was reassigned before the write
    #[error("Lock {lock_id} on game {game_id} is no longer valid")]
    Fenced { game_id: String, lock_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ConcurrencyError {
    #[error("Game not found: {0}")]
    GameNotFound(String),

    /// Expected version never matched within the retry budget
    #[error("Version conflict: expected {expected}, found {actual} after {retries} retries")]
    VersionConflict {
        expected: u64,
        actual: u64,
        retries: u32,
    },

    /// Transition returned a version other than `current + expected` increment
    #[error("Invalid version increment: current {current}, expected {expected}, returned {returned}")]
    InvalidVersionIncrement {
        current: u64,
        expected: u64,
        returned: u64,
    },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Caller-supplied transition failed
    #[error("Transition failed: {0}")]
    Transition(String),

    #[error("Batch contains no actions")]
    EmptyBatch,

    #[error("Game already exists: {0}")]
    GameExists(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Invalid event: {0}")]
    Validation(String),

    /// Returned by subscriber handlers; never reaches the emitter
    #[error("Event handler failed: {0}")]
    Handler(String),
}

/// Caller-visible failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    PermissionDenied,
    GameNotFound,
    ValidationError,
    DatabaseError,
    Timeout,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::GameNotFound => "GAME_NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Structured failure carried inside operation results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl OperationError {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        mut self,
        details: Value,
    ) -> Self {
        self.details = Some(details);
        self
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Storage(_) => ErrorCode::DatabaseError,
            Error::Lock(_) => ErrorCode::PermissionDenied,
            Error::Concurrency(e) => match e {
                ConcurrencyError::GameNotFound(_) => ErrorCode::GameNotFound,
                ConcurrencyError::Timeout(_) => ErrorCode::Timeout,
                ConcurrencyError::VersionConflict { .. }
                | ConcurrencyError::InvalidVersionIncrement { .. }
                | ConcurrencyError::Transition(_)
                | ConcurrencyError::EmptyBatch
                | ConcurrencyError::GameExists(_) => ErrorCode::ValidationError,
            },
            Error::Event(EventError::Validation(_)) => ErrorCode::ValidationError,
            Error::Event(EventError::Handler(_)) => ErrorCode::Internal,
            Error::Config(_) => ErrorCode::ValidationError,
            Error::Fatal(_) => ErrorCode::Internal,
        }
    }

    /// Machine-readable context for the failure, if any
    pub fn details(&self) -> Option<Value> {
        match self {
            Error::Lock(LockError::Held {
                game_id,
                holder_id,
                operation,
                expires_at,
            }) => Some(json!({
                "gameId": game_id,
                "lockedBy": holder_id,
                "operation": operation,
                "expiresAt": expires_at,
            })),
            Error::Lock(LockError::NotOwner {
                game_id,
                lock_id,
                current_lock_id,
            }) => Some(json!({
                "gameId": game_id,
                "lockId": lock_id,
                "currentLockId": current_lock_id,
            })),
            Error::Lock(LockError::Fenced { game_id, lock_id }) => Some(json!({
                "gameId": game_id,
                "lockId": lock_id,
            })),
            Error::Concurrency(ConcurrencyError::VersionConflict {
                expected,
                actual,
                retries,
            }) => Some(json!({
                "expectedVersion": expected,
                "currentVersion": actual,
                "retries": retries,
            })),
            Error::Concurrency(ConcurrencyError::InvalidVersionIncrement {
                current,
                expected,
                returned,
            }) => Some(json!({
                "currentVersion": current,
                "expectedVersion": expected,
                "returnedVersion": returned,
            })),
            Error::Concurrency(ConcurrencyError::Timeout(d)) => Some(json!({
                "timeoutMs": d.as_millis() as u64,
            })),
            _ => None,
        }
    }

    /// Lease contention is the only failure the executor retries
    pub(crate) fn is_lock_contention(&self) -> bool {
        matches!(self, Error::Lock(LockError::Held { .. }))
    }
}

impl From<&Error> for OperationError {
    fn from(e: &Error) -> Self {
        OperationError {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

impl From<Error> for OperationError {
    fn from(e: Error) -> Self {
        OperationError::from(&e)
    }
}

// ============== Conversion Implementations ============== //
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(StorageError::Serialization(e))
    }
}
