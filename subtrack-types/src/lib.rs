//! Core type definitions for the subtrack sync engine.
//!
//! This crate defines the fundamental types shared by the local store and
//! the sync layer:
//! - Owner and record identifiers (UUID v7 / remote-assigned strings)
//! - Owner-scoped cache collections and cached records
//! - Queued mutations and their status lifecycle
//!
//! Anything UI-facing (view models, formatting, report arithmetic) belongs
//! to the application layer, not here.

mod collection;
mod ids;
mod mutation;
mod record;

pub use collection::Collection;
pub use ids::{OwnerId, QueueItemId, RecordId};
pub use mutation::{MutationAction, QueueItem, QueueStatus};
pub use record::{CacheRecord, CollectionCount, SyncMarker};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("unknown mutation action: {0}")]
    UnknownAction(String),
}
