//! Durable FIFO queue of pending remote mutations.

use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use subtrack_types::{
    Collection, MutationAction, OwnerId, QueueItem, QueueItemId, QueueStatus, RecordId,
};
use tracing::debug;

/// Durable, ordered list of pending write operations against the remote
/// service.
///
/// Row ids are assigned by SQLite AUTOINCREMENT, so ordering by
/// `(enqueued_at, id)` is exactly enqueue order. Status transitions are
/// `pending → syncing → {removed | pending | failed}`; a completed item is
/// deleted, and a failed item stays until explicitly cleared.
pub struct QueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl QueueStore {
    /// Opens (or creates) a queue store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        store.recover_interrupted()?;
        Ok(store)
    }

    /// Opens an in-memory queue store (for testing).
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
            CREATE TABLE IF NOT EXISTS mutation_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                action TEXT NOT NULL,
                collection TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                target_id TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                retry_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                enqueued_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_mutation_queue_status
                ON mutation_queue (status, enqueued_at);
            ",
        )?;
        Ok(())
    }

    // ── Enqueue / fetch ──────────────────────────────────────────

    /// Appends a mutation in `pending` status and returns its id.
    pub fn enqueue(
        &self,
        action: MutationAction,
        collection: Collection,
        owner_id: &OwnerId,
        payload: &serde_json::Value,
        target_id: Option<&RecordId>,
    ) -> StorageResult<QueueItemId> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO mutation_queue
                 (action, collection, owner_id, payload, target_id, status, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
            params![
                action.as_str(),
                collection.as_str(),
                owner_id.to_string(),
                serde_json::to_string(payload)?,
                target_id.map(|id| id.as_str().to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = QueueItemId::new(conn.last_insert_rowid());
        debug!("enqueued {} as queue item {}", action, id);
        Ok(id)
    }

    /// Fetches a single item by id.
    pub fn get(&self, id: QueueItemId) -> StorageResult<Option<QueueItem>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM mutation_queue WHERE id = ?1"),
            params![id.as_i64()],
            decode_item,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Items eligible for a drain pass: `pending` status, oldest first.
    /// Failed items are terminal and never eligible.
    pub fn list_eligible(&self) -> StorageResult<Vec<QueueItem>> {
        self.list_with_status(QueueStatus::Pending)
    }

    /// The oldest eligible item, if any.
    pub fn next_eligible(&self) -> StorageResult<Option<QueueItem>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM mutation_queue
                 WHERE status = 'pending'
                 ORDER BY enqueued_at ASC, id ASC LIMIT 1"
            ),
            [],
            decode_item,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All items with the given status, oldest first.
    pub fn list_with_status(&self, status: QueueStatus) -> StorageResult<Vec<QueueItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM mutation_queue
             WHERE status = ?1
             ORDER BY enqueued_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![status.as_str()], decode_item)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // ── Status transitions ───────────────────────────────────────

    /// Marks an item as currently syncing.
    pub fn mark_syncing(&self, id: QueueItemId) -> StorageResult<()> {
        self.set_status(id, "UPDATE mutation_queue SET status = 'syncing' WHERE id = ?1")
    }

    /// Removes a successfully synced item.
    pub fn mark_completed(&self, id: QueueItemId) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id.as_i64()])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }

    /// Records a transient failure: increments the retry count and puts the
    /// item back in `pending` so a future pass picks it up again.
    pub fn mark_retry(&self, id: QueueItemId, error: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE mutation_queue
             SET status = 'pending', retry_count = retry_count + 1, last_error = ?2
             WHERE id = ?1",
            params![id.as_i64(), error],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }

    /// Marks an item as terminally failed. It stays in the queue, excluded
    /// from eligibility, until explicitly cleared.
    pub fn mark_failed(&self, id: QueueItemId, error: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE mutation_queue SET status = 'failed', last_error = ?2 WHERE id = ?1",
            params![id.as_i64(), error],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }

    /// Reverts a `syncing` item to `pending` without counting a retry.
    /// Used when a pass is aborted by connectivity loss mid-item.
    pub fn mark_aborted(&self, id: QueueItemId) -> StorageResult<()> {
        self.set_status(id, "UPDATE mutation_queue SET status = 'pending' WHERE id = ?1")
    }

    /// Requeues every `syncing` row, returning how many were recovered.
    ///
    /// An item is only legitimately `syncing` while a drain pass is live;
    /// rows still in that state on open, or when a new pass takes the
    /// lease, were stranded by an interrupted process and would otherwise
    /// never be dispatched again. Recovery does not count a retry.
    pub fn recover_interrupted(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let recovered = conn.execute(
            "UPDATE mutation_queue SET status = 'pending' WHERE status = 'syncing'",
            [],
        )?;
        if recovered > 0 {
            debug!("recovered {} interrupted queue items", recovered);
        }
        Ok(recovered)
    }

    /// Removes an item regardless of status (manual clearing).
    pub fn remove(&self, id: QueueItemId) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM mutation_queue WHERE id = ?1", params![id.as_i64()])?;
        Ok(())
    }

    /// Removes all `failed` items, returning how many were discarded.
    pub fn clear_failed(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM mutation_queue WHERE status = 'failed'", [])?;
        debug!("discarded {} failed queue items", removed);
        Ok(removed)
    }

    // ── Diagnostics ──────────────────────────────────────────────

    /// Live counts: (not-yet-confirmed items, terminally failed items).
    /// `syncing` counts as pending — the work is still outstanding.
    pub fn counts(&self) -> StorageResult<(usize, usize)> {
        let conn = self.conn.lock().unwrap();
        let pending: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutation_queue WHERE status IN ('pending', 'syncing')",
            [],
            |row| row.get(0),
        )?;
        let failed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutation_queue WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;
        Ok((pending as usize, failed as usize))
    }

    /// True when nothing is queued at all.
    pub fn is_empty(&self) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM mutation_queue", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    fn set_status(&self, id: QueueItemId, sql: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(sql, params![id.as_i64()])?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }
}

const COLUMNS: &str =
    "id, action, collection, owner_id, payload, target_id, status, retry_count, last_error, enqueued_at";

fn decode_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueItem> {
    let action: String = row.get(1)?;
    let collection: String = row.get(2)?;
    let owner: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let target: Option<String> = row.get(5)?;
    let status: String = row.get(6)?;
    let enqueued: String = row.get(9)?;

    let invalid = |idx: usize, msg: String| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            msg.into(),
        )
    };

    Ok(QueueItem {
        id: QueueItemId::new(row.get(0)?),
        action: action
            .parse()
            .map_err(|e| invalid(1, format!("bad action: {e}")))?,
        collection: collection
            .parse()
            .map_err(|e| invalid(2, format!("bad collection: {e}")))?,
        owner_id: owner
            .parse()
            .map_err(|e| invalid(3, format!("bad owner_id: {e}")))?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| invalid(4, format!("bad payload: {e}")))?,
        target_id: target.map(RecordId::new),
        status: match status.as_str() {
            "pending" => QueueStatus::Pending,
            "syncing" => QueueStatus::Syncing,
            "failed" => QueueStatus::Failed,
            other => return Err(invalid(6, format!("bad status: {other}"))),
        },
        retry_count: row.get::<_, i64>(7)? as u32,
        last_error: row.get(8)?,
        enqueued_at: DateTime::parse_from_rfc3339(&enqueued)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| invalid(9, format!("bad enqueued_at: {e}")))?,
    })
}
