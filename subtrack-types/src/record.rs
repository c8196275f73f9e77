//! Cached entity records.

use crate::{Collection, OwnerId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local-only confirmation marker on a cached record.
///
/// `PendingSync` means the record reflects an optimistic local mutation the
/// remote service has not confirmed yet. The marker is never sent to the
/// remote; it exists so consumers can distinguish confirmed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMarker {
    /// The record matches the last authoritative state we saw.
    Synced,
    /// The record carries an unconfirmed optimistic mutation.
    PendingSync,
}

impl SyncMarker {
    /// Stable string form, used as the SQL column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncMarker::Synced => "synced",
            SyncMarker::PendingSync => "pending_sync",
        }
    }
}

/// The last known state of a domain entity in the local cache.
///
/// Created on first fetch or on optimistic mutation; overwritten on every
/// subsequent put (last-write-wins); destroyed by explicit delete or a
/// cache clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    /// Record identifier (authoritative, or temporary until confirmed).
    pub id: RecordId,
    /// The account this record belongs to.
    pub owner_id: OwnerId,
    /// The domain payload.
    pub payload: T,
    /// When this record was written to the cache.
    pub cached_at: DateTime<Utc>,
    /// Confirmation state of the payload.
    pub sync_marker: SyncMarker,
}

impl<T> CacheRecord<T> {
    /// Creates a confirmed record cached now.
    pub fn synced(id: RecordId, owner_id: OwnerId, payload: T) -> Self {
        Self {
            id,
            owner_id,
            payload,
            cached_at: Utc::now(),
            sync_marker: SyncMarker::Synced,
        }
    }

    /// Creates an optimistic, not-yet-confirmed record cached now.
    pub fn pending(id: RecordId, owner_id: OwnerId, payload: T) -> Self {
        Self {
            id,
            owner_id,
            payload,
            cached_at: Utc::now(),
            sync_marker: SyncMarker::PendingSync,
        }
    }

    /// Maps the payload, keeping identity and metadata.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheRecord<U> {
        CacheRecord {
            id: self.id,
            owner_id: self.owner_id,
            payload: f(self.payload),
            cached_at: self.cached_at,
            sync_marker: self.sync_marker,
        }
    }
}

/// Per-collection record count, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCount {
    /// The collection.
    pub collection: Collection,
    /// Number of records currently cached.
    pub count: usize,
}
