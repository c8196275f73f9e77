//! Error types for the sync layer.

use crate::remote::RemoteError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
///
/// Failures of individual queued mutations are never surfaced through this
/// type — they are captured per item during a drain and reported only via
/// the failed-item count and the `Error` lifecycle event.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local persistence failed.
    #[error("storage error: {0}")]
    Storage(#[from] subtrack_store::StorageError),

    /// The operation requires connectivity and the monitor reports offline.
    #[error("offline")]
    Offline,

    /// A remote call outside the drain path failed (e.g. a full refresh).
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
