//! Durable multi-collection cache of entity records.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use subtrack_types::{CacheRecord, Collection, CollectionCount, OwnerId, RecordId, SyncMarker};
use tracing::debug;

/// Durable key/value cache keyed by `(collection, id)` with a secondary
/// index by owner. Writes are last-write-wins and committed before the call
/// returns.
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl CacheStore {
    /// Opens (or creates) a cache store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory cache store (for testing).
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
            CREATE TABLE IF NOT EXISTS cache_records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                sync_marker TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_records_owner
                ON cache_records (collection, owner_id);
            ",
        )?;
        Ok(())
    }

    // ── Record operations ────────────────────────────────────────

    /// Upserts a record by id. Last write wins.
    pub fn put<T: Serialize>(
        &self,
        collection: Collection,
        record: &CacheRecord<T>,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO cache_records
                 (collection, id, owner_id, payload, cached_at, sync_marker)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection.as_str(),
                record.id.as_str(),
                record.owner_id.to_string(),
                payload,
                record.cached_at.to_rfc3339(),
                record.sync_marker.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Fetches a record by id, or `None` if absent.
    pub fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> StorageResult<Option<CacheRecord<T>>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, owner_id, payload, cached_at, sync_marker
                 FROM cache_records WHERE collection = ?1 AND id = ?2",
                params![collection.as_str(), id.as_str()],
                raw_row,
            )
            .optional()?;

        row.map(decode_record).transpose()
    }

    /// Lists all of an owner's records in a collection. Order is not
    /// guaranteed.
    pub fn list_by_owner<T: DeserializeOwned>(
        &self,
        collection: Collection,
        owner_id: &OwnerId,
    ) -> StorageResult<Vec<CacheRecord<T>>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, payload, cached_at, sync_marker
             FROM cache_records WHERE collection = ?1 AND owner_id = ?2",
        )?;
        let rows = stmt.query_map(params![collection.as_str(), owner_id.to_string()], raw_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(decode_record(row?)?);
        }
        Ok(result)
    }

    /// Deletes a record by id. Deleting an absent record is a no-op.
    pub fn delete(&self, collection: Collection, id: &RecordId) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cache_records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id.as_str()],
        )?;
        Ok(())
    }

    /// Atomically replaces a record's id, e.g. swapping a temporary
    /// correlation id for the authoritative id returned by the remote.
    pub fn replace_id<T: Serialize>(
        &self,
        collection: Collection,
        old_id: &RecordId,
        record: &CacheRecord<T>,
    ) -> StorageResult<()> {
        let payload = serde_json::to_string(&record.payload)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM cache_records WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), old_id.as_str()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO cache_records
                 (collection, id, owner_id, payload, cached_at, sync_marker)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                collection.as_str(),
                record.id.as_str(),
                record.owner_id.to_string(),
                payload,
                record.cached_at.to_rfc3339(),
                record.sync_marker.as_str(),
            ],
        )?;
        tx.commit()?;
        debug!("replaced cached id {} with {}", old_id, record.id);
        Ok(())
    }

    /// Updates the sync marker on a record. A no-op if the record is gone
    /// (it may have been evicted between confirmation and this call).
    pub fn set_marker(
        &self,
        collection: Collection,
        id: &RecordId,
        marker: SyncMarker,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE cache_records SET sync_marker = ?3
             WHERE collection = ?1 AND id = ?2",
            params![collection.as_str(), id.as_str(), marker.as_str()],
        )?;
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────────

    /// Removes one owner's records from every collection, or wipes the
    /// whole cache when no owner is given.
    pub fn clear(&self, owner_id: Option<&OwnerId>) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        match owner_id {
            Some(owner) => {
                let removed = conn.execute(
                    "DELETE FROM cache_records WHERE owner_id = ?1",
                    params![owner.to_string()],
                )?;
                debug!("cleared {} cached records for owner {}", removed, owner);
            }
            None => {
                conn.execute("DELETE FROM cache_records", [])?;
                debug!("cleared entire cache");
            }
        }
        Ok(())
    }

    /// Per-collection record counts for diagnostics. Every collection is
    /// reported, including empty ones.
    pub fn size_report(&self) -> StorageResult<Vec<CollectionCount>> {
        let conn = self.conn.lock().unwrap();
        let mut report = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_records WHERE collection = ?1",
                params![collection.as_str()],
                |row| row.get(0),
            )?;
            report.push(CollectionCount {
                collection,
                count: count as usize,
            });
        }
        Ok(report)
    }
}

/// Raw row as read from SQLite, before typed decoding.
type RawRow = (String, String, String, String, String);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn decode_record<T: DeserializeOwned>(raw: RawRow) -> StorageResult<CacheRecord<T>> {
    let (id, owner, payload, cached_at, marker) = raw;
    let owner_id: OwnerId = owner
        .parse()
        .map_err(|e| StorageError::InvalidData(format!("bad owner_id {owner}: {e}")))?;
    let cached_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&cached_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("bad cached_at {cached_at}: {e}")))?;
    let sync_marker = match marker.as_str() {
        "synced" => SyncMarker::Synced,
        "pending_sync" => SyncMarker::PendingSync,
        other => {
            return Err(StorageError::InvalidData(format!(
                "bad sync_marker {other}"
            )))
        }
    };
    Ok(CacheRecord {
        id: RecordId::new(id),
        owner_id,
        payload: serde_json::from_str(&payload)?,
        cached_at,
        sync_marker,
    })
}
