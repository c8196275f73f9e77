//! Owner-scoped cache collections.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A logical partition of the local cache.
///
/// Every collection is keyed by `(collection, record id)` with a secondary
/// index by owner. `Preferences` and `StatsSnapshots` hold one record per
/// owner; the put semantics (last-write-wins) make that most-recent-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Tracked subscriptions.
    Subscriptions,
    /// Renewal/price-change notifications.
    Notifications,
    /// User-defined spending categories.
    Categories,
    /// Per-owner preferences (one record per owner).
    Preferences,
    /// Latest aggregated statistics snapshot (one record per owner).
    StatsSnapshots,
}

impl Collection {
    /// All collections, in a stable order. Owner-scoped eviction walks this.
    pub const ALL: [Collection; 5] = [
        Collection::Subscriptions,
        Collection::Notifications,
        Collection::Categories,
        Collection::Preferences,
        Collection::StatsSnapshots,
    ];

    /// Stable string name, used as the SQL partition key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Collection::Subscriptions => "subscriptions",
            Collection::Notifications => "notifications",
            Collection::Categories => "categories",
            Collection::Preferences => "preferences",
            Collection::StatsSnapshots => "stats_snapshots",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subscriptions" => Ok(Collection::Subscriptions),
            "notifications" => Ok(Collection::Notifications),
            "categories" => Ok(Collection::Categories),
            "preferences" => Ok(Collection::Preferences),
            "stats_snapshots" => Ok(Collection::StatsSnapshots),
            other => Err(Error::UnknownCollection(other.to_string())),
        }
    }
}
