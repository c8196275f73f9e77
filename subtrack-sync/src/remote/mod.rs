//! Remote data service boundary.
//!
//! The remote service is an authoritative CRUD backend consumed through a
//! narrow interface. Every operation must be safe to invoke more than once
//! for the same logical mutation: the coordinator retries verbatim, and
//! creates carry a client-generated correlation id the server uses to
//! dedupe.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtrack_types::{Collection, OwnerId, RecordId};
use thiserror::Error;

pub use http::{HttpRemote, HttpRemoteConfig};

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A remote call failure, classified at the boundary.
///
/// Transient failures (connectivity, timeouts, server errors) count toward
/// an item's retry budget; terminal failures (validation, permissions) fail
/// the item immediately instead of burning retries.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Worth retrying: network fault, timeout, or 5xx-class server error.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Not worth retrying: the remote rejected the mutation itself.
    #[error("remote rejected the operation: {0}")]
    Terminal(String),
}

impl RemoteError {
    /// True for failures that should consume retry budget.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

/// An authoritative record as returned by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Remote-assigned identifier.
    pub id: RecordId,
    /// The owning account.
    pub owner_id: OwnerId,
    /// The entity payload.
    pub payload: serde_json::Value,
}

/// Narrow CRUD interface onto the authoritative backend.
///
/// All operations are idempotent under retry.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Creates an entity. The correlation id identifies this logical create
    /// across retries so the server never creates a duplicate.
    async fn create_entity(
        &self,
        collection: Collection,
        correlation_id: &RecordId,
        payload: &serde_json::Value,
    ) -> RemoteResult<RemoteRecord>;

    /// Updates an entity. Returns the authoritative record when the server
    /// echoes one back, `None` when it confirms without a body.
    async fn update_entity(
        &self,
        collection: Collection,
        id: &RecordId,
        payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>>;

    /// Deletes an entity. Deleting an already-deleted entity succeeds.
    async fn delete_entity(&self, collection: Collection, id: &RecordId) -> RemoteResult<()>;

    /// Marks a notification as read. Idempotent.
    async fn mark_read(&self, id: &RecordId) -> RemoteResult<()>;

    /// Replaces an owner's preferences document.
    async fn update_preferences(
        &self,
        owner: &OwnerId,
        payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>>;

    /// Fetches all of an owner's records in a collection. Used by the full
    /// refresh path, never by the queue drain.
    async fn fetch_all(
        &self,
        collection: Collection,
        owner: &OwnerId,
    ) -> RemoteResult<Vec<RemoteRecord>>;
}
