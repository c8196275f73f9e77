//! Queued mutations awaiting remote confirmation.

use crate::{Collection, OwnerId, QueueItemId, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The remote operation a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationAction {
    /// Create a new entity; the payload carries the full entity JSON and the
    /// target id is the temporary correlation id.
    CreateEntity,
    /// Update an existing entity by id.
    UpdateEntity,
    /// Delete an entity by id.
    DeleteEntity,
    /// Mark a notification as read.
    MarkRead,
    /// Replace the owner's preferences document.
    UpdatePreferences,
}

impl MutationAction {
    /// Stable string form, used as the SQL column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MutationAction::CreateEntity => "create_entity",
            MutationAction::UpdateEntity => "update_entity",
            MutationAction::DeleteEntity => "delete_entity",
            MutationAction::MarkRead => "mark_read",
            MutationAction::UpdatePreferences => "update_preferences",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_entity" => Ok(MutationAction::CreateEntity),
            "update_entity" => Ok(MutationAction::UpdateEntity),
            "delete_entity" => Ok(MutationAction::DeleteEntity),
            "mark_read" => Ok(MutationAction::MarkRead),
            "update_preferences" => Ok(MutationAction::UpdatePreferences),
            other => Err(crate::Error::UnknownAction(other.to_string())),
        }
    }
}

/// Status of a queued mutation.
///
/// Valid transitions: `Pending → Syncing → {removed | Pending | Failed}`.
/// A completed item is deleted from the queue rather than kept in a
/// terminal state; `Failed` is terminal until explicitly cleared and is
/// never auto-retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting to be drained (or re-queued after a transient failure).
    Pending,
    /// Currently being executed against the remote service.
    Syncing,
    /// Retries exhausted or terminally rejected; awaiting manual clearing.
    Failed,
}

impl QueueStatus {
    /// Stable string form, used as the SQL column value.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Syncing => "syncing",
            QueueStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durably enqueued write operation against the remote service.
///
/// At most one item is in `Syncing` status at any time per coordinator
/// instance (single-flight).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Monotonic queue-assigned identifier.
    pub id: QueueItemId,
    /// The remote operation to perform.
    pub action: MutationAction,
    /// The collection the mutation targets.
    pub collection: Collection,
    /// The owner on whose behalf the mutation was enqueued.
    pub owner_id: OwnerId,
    /// Operation payload (entity JSON, preferences document, …).
    pub payload: serde_json::Value,
    /// Target record for updates/deletes; correlation id for creates.
    pub target_id: Option<RecordId>,
    /// Current status.
    pub status: QueueStatus,
    /// Number of transient failures so far.
    pub retry_count: u32,
    /// Message of the most recent failure, if any.
    pub last_error: Option<String>,
    /// When the item was enqueued; drains process oldest first.
    pub enqueued_at: DateTime<Utc>,
}
