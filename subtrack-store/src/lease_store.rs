//! Leader lease for multi-process drain exclusion.
//!
//! The queue and cache may be shared by several process instances (multiple
//! windows/tabs over one database file). A timestamped lease row with a TTL
//! ensures only one of them believes it is the drainer; an expired lease can
//! be stolen by any instance.

use crate::error::StorageResult;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Default lease duration. Long enough to cover a slow remote call, short
/// enough that a crashed holder does not block draining for long.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Single-row lease table guarding the drain loop across processes.
pub struct LeaseStore {
    conn: Arc<Mutex<Connection>>,
}

impl LeaseStore {
    /// Opens (or creates) a lease store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory lease store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS drain_lease (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                holder TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Attempts to take (or re-take) the lease for `holder`.
    ///
    /// Succeeds when the lease is free, expired, or already held by this
    /// holder. Returns false when a different holder still has a live lease.
    pub fn try_acquire(&self, holder: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Utc::now().timestamp_millis();
        let expires = now + ttl.as_millis() as i64;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: Option<(String, i64)> = tx
            .query_row(
                "SELECT holder, expires_at FROM drain_lease WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((current_holder, current_expiry)) = current {
            if current_holder != holder && current_expiry > now {
                return Ok(false);
            }
            if current_holder != holder {
                debug!("stealing expired drain lease from {}", current_holder);
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO drain_lease (id, holder, expires_at) VALUES (1, ?1, ?2)",
            params![holder, expires],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Extends the lease, provided this holder still owns it.
    pub fn renew(&self, holder: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Utc::now().timestamp_millis();
        let expires = now + ttl.as_millis() as i64;
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE drain_lease SET expires_at = ?2 WHERE id = 1 AND holder = ?1",
            params![holder, expires],
        )?;
        Ok(updated == 1)
    }

    /// Releases the lease if this holder owns it.
    pub fn release(&self, holder: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM drain_lease WHERE id = 1 AND holder = ?1",
            params![holder],
        )?;
        Ok(())
    }

    /// The current holder, if the lease is live.
    pub fn current_holder(&self) -> StorageResult<Option<String>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT holder, expires_at FROM drain_lease WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.and_then(|(holder, expiry)| (expiry > now).then_some(holder)))
    }
}
