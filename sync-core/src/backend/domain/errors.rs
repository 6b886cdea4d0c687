//! Error types for the synchronization core.
//!
//! Transient failures (change-tag conflicts, partition creation hiccups) are
//! recovered inside the orchestrator and ledger with a bounded retry. Everything
//! else reaches the caller as a [`SyncError`], which carries both a typed
//! variant and a human-readable message for the UI.

use thiserror::Error;

use crate::backend::storage::record::RecordType;

/// A remote record did not match the declared schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {record_type} record: field `{field}` {reason}")]
pub struct DecodeError {
    pub record_type: String,
    pub field: String,
    pub reason: String,
}

impl DecodeError {
    pub fn missing(record_type: RecordType, field: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            field: field.to_string(),
            reason: "is missing".to_string(),
        }
    }

    pub fn wrong_type(record_type: RecordType, field: &str, expected: &str, found: &str) -> Self {
        Self {
            record_type: record_type.to_string(),
            field: field.to_string(),
            reason: format!("has type {found}, expected {expected}"),
        }
    }

    pub fn invalid(record_type: RecordType, field: &str, reason: impl Into<String>) -> Self {
        Self {
            record_type: record_type.to_string(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures surfaced by the synchronization core
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Record {record} was changed by another device")]
    ConcurrencyConflict { record: String },

    #[error("Could not sync {record} after {attempts} attempts")]
    SyncFailed { record: String, attempts: u32 },

    #[error("Not enough coins: balance is {balance}, cost is {cost}")]
    InsufficientFunds { balance: i64, cost: i64 },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Partition {0} is unavailable")]
    PartitionUnavailable(String),

    #[error("Partition {0} already exists")]
    PartitionExists(String),

    #[error("{0} is already persisted and must be modified instead of saved")]
    AlreadyPersisted(String),

    #[error("{0} has not been saved yet")]
    NotPersisted(String),

    #[error("Remote call `{operation}` timed out after {millis} ms")]
    Timeout { operation: String, millis: u64 },

    /// A write timed out and the record has since changed in a way that
    /// hides whether the write landed
    #[error("Could not tell whether the update to {record} was applied: {source}")]
    CommitUnknown {
        record: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Unknown {kind} id {id}")]
    UnknownCatalogEntry { kind: &'static str, id: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Rolling back reward {reward} failed; original failure: {source}")]
    CompensationFailed {
        reward: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Remote store error: {0}")]
    Store(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Transient failures a caller may reasonably retry later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConcurrencyConflict { .. }
                | SyncError::SyncFailed { .. }
                | SyncError::PartitionUnavailable(_)
                | SyncError::Timeout { .. }
                | SyncError::Store(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::ConcurrencyConflict { .. })
    }

    /// The call stopped waiting, so its write may still have reached the store
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, SyncError::Timeout { .. })
    }

    /// Text suitable for an alert in the parent or child app
    pub fn user_message(&self) -> String {
        match self {
            SyncError::RecordNotFound(_) => {
                "This item no longer exists. Pull to refresh and try again.".to_string()
            }
            SyncError::Decode(_) => {
                "Some synced data could not be read. Please update the app.".to_string()
            }
            SyncError::ConcurrencyConflict { .. } | SyncError::SyncFailed { .. } => {
                "Another device changed this at the same time. Please try again.".to_string()
            }
            SyncError::InsufficientFunds { balance, cost } => {
                format!("You need {} more coins for this reward.", cost - balance)
            }
            SyncError::AccessDenied(_) => {
                "This profile is no longer shared with you. Ask a parent to share it again."
                    .to_string()
            }
            SyncError::PartitionUnavailable(_) | SyncError::Timeout { .. } | SyncError::Store(_) => {
                "Could not reach the cloud. Check your connection and try again.".to_string()
            }
            SyncError::CommitUnknown { .. } => {
                "The cloud did not confirm this change. Pull to refresh to see the latest balance."
                    .to_string()
            }
            SyncError::CompensationFailed { .. } => {
                "The purchase could not be completed and is being cleaned up.".to_string()
            }
            other => other.to_string(),
        }
    }
}
