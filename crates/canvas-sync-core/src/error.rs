//! Error taxonomy surfaced in logs.
//!
//! None of these is fatal to the engine. Each concern has its own error type
//! ([`StorageError`], [`RemoteError`], [`WatchError`]); they fold into
//! [`SyncError`] when reported.

use crate::remote::RemoteError;
use crate::storage::StorageError;
use crate::watch::WatchError;
use thiserror::Error;

/// Top-level sync error categories.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Durable storage is disabled; the session continues memory-only.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),
    /// A persisted record failed validation and will be repaired or cleared.
    #[error("Stored canvas is corrupt: {0}")]
    StorageCorrupt(String),
    /// Other local storage failure.
    #[error("Local storage error: {0}")]
    Storage(String),
    /// The remote service could not be reached or answered with an error.
    #[error("Remote canvas unreachable: {0}")]
    NetworkUnreachable(String),
    /// Incoming data was incomplete and has been filled with defaults.
    #[error("Filled missing canvas data: {0}")]
    NormalizationGap(String),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => SyncError::StorageUnavailable(msg),
            StorageError::Corrupt(msg) => SyncError::StorageCorrupt(msg),
            other => SyncError::Storage(other.to_string()),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        SyncError::NetworkUnreachable(err.to_string())
    }
}

impl From<WatchError> for SyncError {
    fn from(err: WatchError) -> Self {
        SyncError::NetworkUnreachable(err.to_string())
    }
}
