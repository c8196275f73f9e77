//! Consumer-facing sync service.
//!
//! This is the API the application layer talks to: enqueue entry points
//! that apply optimistically and persist the mutation, status/diagnostics
//! accessors, and the manual sync trigger. Construct one per session and
//! inject it into consumers; nothing here is a global.

use crate::coordinator::{
    preferences_record_id, DrainOutcome, SyncConfig, SyncCoordinator, SyncLifecycle,
};
use crate::error::{SyncError, SyncResult};
use crate::monitor::NetworkMonitor;
use crate::remote::RemoteService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtrack_store::{CacheStore, LeaseStore, QueueStore};
use subtrack_types::{
    CacheRecord, Collection, CollectionCount, MutationAction, OwnerId, RecordId,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A point-in-time view of the sync subsystem, recomputed on request from
/// the network monitor and a live scan of the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Connectivity as last reported by the platform.
    pub is_online: bool,
    /// Whether a drain pass is running right now.
    pub sync_in_progress: bool,
    /// Queued mutations awaiting confirmation (including one in flight).
    pub pending_items: usize,
    /// Terminally failed mutations awaiting manual clearing.
    pub failed_items: usize,
    /// When the last drain pass completed.
    pub last_sync_time: Option<DateTime<Utc>>,
}

/// Offline-first facade over the cache, queue and coordinator.
#[derive(Clone)]
pub struct SyncService {
    cache: Arc<CacheStore>,
    queue: Arc<QueueStore>,
    monitor: NetworkMonitor,
    coordinator: Arc<SyncCoordinator>,
    remote: Arc<dyn RemoteService>,
}

impl SyncService {
    /// Wires up a service over the given stores and remote.
    pub fn new(
        cache: Arc<CacheStore>,
        queue: Arc<QueueStore>,
        lease: Arc<LeaseStore>,
        remote: Arc<dyn RemoteService>,
        monitor: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            queue.clone(),
            cache.clone(),
            lease,
            remote.clone(),
            monitor.clone(),
            config,
        ));
        Self {
            cache,
            queue,
            monitor,
            coordinator,
            remote,
        }
    }

    /// The network monitor, for platform glue to feed connectivity signals.
    pub fn monitor(&self) -> &NetworkMonitor {
        &self.monitor
    }

    /// Read access to the local cache (e.g. for the statistics consumer).
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    // ── Mutation entry points ────────────────────────────────────

    /// Queues a create. The record appears in the cache immediately under a
    /// temporary correlation id, which the drain swaps for the
    /// authoritative id once the remote confirms.
    pub fn enqueue_create(
        &self,
        collection: Collection,
        owner: OwnerId,
        payload: serde_json::Value,
    ) -> SyncResult<RecordId> {
        let temp_id = RecordId::temporary();
        let record = CacheRecord::pending(temp_id.clone(), owner, payload.clone());
        self.cache.put(collection, &record)?;
        self.queue.enqueue(
            MutationAction::CreateEntity,
            collection,
            &owner,
            &payload,
            Some(&temp_id),
        )?;
        self.kick_drain_if_online();
        Ok(temp_id)
    }

    /// Queues an update, applying it to the cache immediately.
    pub fn enqueue_update(
        &self,
        collection: Collection,
        owner: OwnerId,
        id: RecordId,
        payload: serde_json::Value,
    ) -> SyncResult<()> {
        let record = CacheRecord::pending(id.clone(), owner, payload.clone());
        self.cache.put(collection, &record)?;
        self.queue.enqueue(
            MutationAction::UpdateEntity,
            collection,
            &owner,
            &payload,
            Some(&id),
        )?;
        self.kick_drain_if_online();
        Ok(())
    }

    /// Queues a delete, removing the cached record immediately.
    pub fn enqueue_delete(
        &self,
        collection: Collection,
        owner: OwnerId,
        id: RecordId,
    ) -> SyncResult<()> {
        self.cache.delete(collection, &id)?;
        self.queue.enqueue(
            MutationAction::DeleteEntity,
            collection,
            &owner,
            &serde_json::Value::Null,
            Some(&id),
        )?;
        self.kick_drain_if_online();
        Ok(())
    }

    /// Queues a mark-read on a notification, flipping the cached copy's
    /// `read` flag immediately when the record is present.
    pub fn enqueue_mark_read(&self, owner: OwnerId, id: RecordId) -> SyncResult<()> {
        let cached: Option<CacheRecord<serde_json::Value>> =
            self.cache.get(Collection::Notifications, &id)?;
        if let Some(existing) = cached {
            let mut payload = existing.payload;
            if let Some(obj) = payload.as_object_mut() {
                obj.insert("read".to_string(), serde_json::Value::Bool(true));
            }
            let record = CacheRecord::pending(id.clone(), owner, payload);
            self.cache.put(Collection::Notifications, &record)?;
        }
        self.queue.enqueue(
            MutationAction::MarkRead,
            Collection::Notifications,
            &owner,
            &serde_json::Value::Null,
            Some(&id),
        )?;
        self.kick_drain_if_online();
        Ok(())
    }

    /// Queues a preferences replacement, applying it to the cache
    /// immediately. One preferences record exists per owner.
    pub fn enqueue_update_preferences(
        &self,
        owner: OwnerId,
        payload: serde_json::Value,
    ) -> SyncResult<()> {
        let id = preferences_record_id(&owner);
        let record = CacheRecord::pending(id, owner, payload.clone());
        self.cache.put(Collection::Preferences, &record)?;
        self.queue.enqueue(
            MutationAction::UpdatePreferences,
            Collection::Preferences,
            &owner,
            &payload,
            None,
        )?;
        self.kick_drain_if_online();
        Ok(())
    }

    // ── Sync control ─────────────────────────────────────────────

    /// Manually triggers a drain pass.
    ///
    /// Rejects immediately with [`SyncError::Offline`] when the monitor
    /// reports offline, without touching any queue item.
    pub async fn trigger_sync(&self) -> SyncResult<DrainOutcome> {
        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }
        self.coordinator.drain().await
    }

    /// Spawns the watcher that starts a drain on every offline→online
    /// transition. Returns the watcher task handle.
    pub fn spawn_auto_drain(&self) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let mut rx = self.monitor.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                if *rx.borrow_and_update() {
                    debug!("back online, starting drain");
                    if let Err(e) = coordinator.drain().await {
                        warn!("reconnect drain failed: {}", e);
                    }
                }
            }
        })
    }

    /// Subscribes to `started | completed | error` lifecycle events.
    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SyncLifecycle> {
        self.coordinator.subscribe()
    }

    // ── Status & maintenance ─────────────────────────────────────

    /// Current sync status, from the monitor and a live queue scan.
    pub fn sync_status(&self) -> SyncResult<SyncStatus> {
        let (pending_items, failed_items) = self.queue.counts()?;
        Ok(SyncStatus {
            is_online: self.monitor.is_online(),
            sync_in_progress: self.coordinator.is_draining(),
            pending_items,
            failed_items,
            last_sync_time: self.coordinator.last_sync_time(),
        })
    }

    /// Discards all terminally failed mutations without retrying them. The
    /// optimistic cache state they produced is left as-is.
    pub fn clear_failed_items(&self) -> SyncResult<usize> {
        Ok(self.queue.clear_failed()?)
    }

    /// Wipes every cached collection for one owner.
    pub fn clear_cache(&self, owner: &OwnerId) -> SyncResult<()> {
        Ok(self.cache.clear(Some(owner))?)
    }

    /// Per-collection cache counts for diagnostics.
    pub fn cache_info(&self) -> SyncResult<Vec<CollectionCount>> {
        Ok(self.cache.size_report()?)
    }

    /// Replaces an owner's cached collection with the authoritative remote
    /// state. A full refresh, separate from the queue drain path.
    pub async fn refresh(&self, collection: Collection, owner: &OwnerId) -> SyncResult<usize> {
        if !self.monitor.is_online() {
            return Err(SyncError::Offline);
        }
        let records = self.remote.fetch_all(collection, owner).await?;

        let stale: Vec<CacheRecord<serde_json::Value>> =
            self.cache.list_by_owner(collection, owner)?;
        for record in &stale {
            self.cache.delete(collection, &record.id)?;
        }
        for remote in &records {
            let record =
                CacheRecord::synced(remote.id.clone(), remote.owner_id, remote.payload.clone());
            self.cache.put(collection, &record)?;
        }
        Ok(records.len())
    }

    /// Starts a background drain when online. Failures are logged; the
    /// enqueue that prompted the kick has already succeeded.
    fn kick_drain_if_online(&self) {
        if !self.monitor.is_online() {
            return;
        }
        // Enqueue entry points are callable from synchronous code; only
        // kick when a runtime is actually driving us.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let coordinator = self.coordinator.clone();
        handle.spawn(async move {
            if let Err(e) = coordinator.drain().await {
                warn!("background drain failed: {}", e);
            }
        });
    }
}
