//! Sync coordinator — drains the mutation queue against the remote service.
//!
//! The coordinator is single-flight: at most one drain pass runs per
//! instance, and a leader lease extends that guarantee across process
//! instances sharing one database. Within a pass, items are processed
//! strictly sequentially, oldest first, so a later mutation never overtakes
//! the earlier mutation it depends on.

use crate::error::SyncResult;
use crate::monitor::NetworkMonitor;
use crate::remote::{RemoteError, RemoteService};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtrack_store::{CacheStore, LeaseStore, QueueStore, StorageResult, DEFAULT_LEASE_TTL};
use subtrack_types::{
    CacheRecord, MutationAction, OwnerId, QueueItem, QueueItemId, QueueStatus, RecordId,
    SyncMarker,
};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the sync coordinator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Transient failures an item may accumulate before it is failed.
    pub max_retries: u32,
    /// Base delay applied between items after a transient failure; the
    /// actual delay is `retry_backoff * retry_count`.
    pub retry_backoff: Duration,
    /// Per-call timeout on the remote service, on top of whatever the
    /// transport itself enforces.
    pub remote_timeout: Duration,
    /// TTL of the cross-process drain lease.
    pub lease_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            remote_timeout: Duration::from_secs(30),
            lease_ttl: DEFAULT_LEASE_TTL,
        }
    }
}

/// Lifecycle events observable by the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncLifecycle {
    /// A drain pass began.
    Started,
    /// A drain pass ran out of eligible items.
    Completed {
        /// Items confirmed by the remote during the pass.
        synced: usize,
    },
    /// Advisory: items were terminally failed during an otherwise
    /// completed pass.
    Error {
        /// Items that transitioned to failed.
        failed: usize,
    },
}

/// How a call to [`SyncCoordinator::drain`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The pass processed every eligible item.
    Completed { synced: usize, failed: usize },
    /// Another pass was already running; this call was a no-op.
    AlreadyDraining,
    /// Another process instance holds the drain lease.
    NotLeader,
    /// Connectivity dropped mid-pass; remaining items were left untouched.
    Interrupted { synced: usize },
}

/// What to write back to the cache once the remote confirms an item.
enum Confirmation {
    /// Replace the optimistic record with the authoritative one, keyed on
    /// the id the cache currently holds. The remote may assign a different
    /// id, so a plain put could leave the optimistic row behind.
    Replace {
        cached_id: RecordId,
        record: CacheRecord<serde_json::Value>,
    },
    /// The optimistic record is already correct; just clear its marker.
    ClearMarker(RecordId),
    /// Nothing to reconcile (deletes).
    Nothing,
}

/// Single-flight orchestrator for the mutation queue.
pub struct SyncCoordinator {
    queue: Arc<QueueStore>,
    cache: Arc<CacheStore>,
    lease: Arc<LeaseStore>,
    remote: Arc<dyn RemoteService>,
    monitor: NetworkMonitor,
    config: SyncConfig,
    /// Lease holder name, unique per coordinator instance.
    holder: String,
    draining: AtomicBool,
    events: broadcast::Sender<SyncLifecycle>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl SyncCoordinator {
    /// Creates a new coordinator over the given stores and remote.
    pub fn new(
        queue: Arc<QueueStore>,
        cache: Arc<CacheStore>,
        lease: Arc<LeaseStore>,
        remote: Arc<dyn RemoteService>,
        monitor: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            queue,
            cache,
            lease,
            remote,
            monitor,
            config,
            holder: format!("drainer-{}", Uuid::new_v4()),
            draining: AtomicBool::new(false),
            events,
            last_sync: Mutex::new(None),
        }
    }

    /// Subscribes to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncLifecycle> {
        self.events.subscribe()
    }

    /// Whether a drain pass is currently running on this instance.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// When the last pass completed, if any has.
    pub fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.lock().unwrap()
    }

    /// Drains the queue against the remote service.
    ///
    /// A second concurrent call returns [`DrainOutcome::AlreadyDraining`]
    /// immediately without touching the queue. Per-item remote failures are
    /// captured on the item and never abort the pass; storage failures do
    /// abort it, since nothing can be recorded without the store.
    pub async fn drain(&self) -> SyncResult<DrainOutcome> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("drain already in progress, ignoring");
            return Ok(DrainOutcome::AlreadyDraining);
        }
        let _flag = DrainFlag(&self.draining);

        if !self.lease.try_acquire(&self.holder, self.config.lease_ttl)? {
            debug!("drain lease held elsewhere, skipping pass");
            return Ok(DrainOutcome::NotLeader);
        }

        let _ = self.events.send(SyncLifecycle::Started);

        // Rows stranded in `syncing` by an interrupted holder are safe to
        // reclaim here: the lease guarantees no other pass is live.
        self.queue.recover_interrupted()?;

        let mut synced = 0usize;
        let mut failed = 0usize;
        let mut attempted: HashSet<QueueItemId> = HashSet::new();

        // Re-snapshot until nothing eligible remains, so items enqueued
        // while the pass runs are drained by it. An item already attempted
        // this pass is excluded: a transient failure waits for the next
        // pass instead of being busy-retried within this one.
        loop {
            let batch: Vec<QueueItem> = self
                .queue
                .list_eligible()?
                .into_iter()
                .filter(|item| !attempted.contains(&item.id))
                .collect();
            if batch.is_empty() {
                break;
            }
            let total = batch.len();
            debug!("drain batch: {} eligible items", total);

            for (position, stale) in batch.into_iter().enumerate() {
                if !self.monitor.is_online() {
                    info!(
                        "connectivity lost, leaving {} items for the next pass",
                        total - position
                    );
                    self.lease.release(&self.holder)?;
                    return Ok(DrainOutcome::Interrupted { synced });
                }

                attempted.insert(stale.id);

                // Re-read: the item may have been removed since the snapshot.
                let Some(item) = self.queue.get(stale.id)? else {
                    continue;
                };
                if item.status != QueueStatus::Pending {
                    continue;
                }

                self.queue.mark_syncing(item.id)?;
                let _ = self.lease.renew(&self.holder, self.config.lease_ttl);

                match self.dispatch(&item).await {
                    Ok(confirmation) => {
                        self.apply_confirmation(&item, confirmation)?;
                        self.queue.mark_completed(item.id)?;
                        synced += 1;
                        debug!("queue item {} confirmed", item.id);
                    }
                    Err(_) if !self.monitor.is_online() => {
                        // A forced abort due to disconnection is not a remote
                        // failure; the item goes back exactly as it was.
                        info!("connectivity lost mid-item, aborting pass");
                        self.queue.mark_aborted(item.id)?;
                        self.lease.release(&self.holder)?;
                        return Ok(DrainOutcome::Interrupted { synced });
                    }
                    Err(RemoteError::Terminal(message)) => {
                        warn!("queue item {} rejected by remote: {}", item.id, message);
                        self.queue.mark_failed(item.id, &message)?;
                        failed += 1;
                    }
                    Err(RemoteError::Transient(message)) => {
                        let attempts = item.retry_count + 1;
                        if attempts >= self.config.max_retries {
                            warn!(
                                "queue item {} exhausted {} retries: {}",
                                item.id, attempts, message
                            );
                            self.queue.mark_failed(item.id, &message)?;
                            failed += 1;
                        } else {
                            debug!(
                                "queue item {} failed transiently (attempt {}): {}",
                                item.id, attempts, message
                            );
                            self.queue.mark_retry(item.id, &message)?;
                            if position + 1 < total {
                                // Keep a flaky remote from being hammered by
                                // the rest of this pass.
                                tokio::time::sleep(self.config.retry_backoff * attempts).await;
                            }
                        }
                    }
                }
            }
        }

        *self.last_sync.lock().unwrap() = Some(Utc::now());
        self.lease.release(&self.holder)?;
        info!("drain completed: {} synced, {} failed", synced, failed);

        let _ = self.events.send(SyncLifecycle::Completed { synced });
        if failed > 0 {
            let _ = self.events.send(SyncLifecycle::Error { failed });
        }
        Ok(DrainOutcome::Completed { synced, failed })
    }

    /// Runs the remote call for one item under the per-call timeout.
    async fn dispatch(&self, item: &QueueItem) -> Result<Confirmation, RemoteError> {
        match timeout(self.config.remote_timeout, self.execute_remote(item)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Transient(format!(
                "remote call timed out after {:?}",
                self.config.remote_timeout
            ))),
        }
    }

    async fn execute_remote(&self, item: &QueueItem) -> Result<Confirmation, RemoteError> {
        match item.action {
            MutationAction::CreateEntity => {
                let temp_id = required_target(item)?;
                let confirmed = self
                    .remote
                    .create_entity(item.collection, &temp_id, &item.payload)
                    .await?;
                let record =
                    CacheRecord::synced(confirmed.id, item.owner_id, confirmed.payload);
                Ok(Confirmation::Replace {
                    cached_id: temp_id,
                    record,
                })
            }
            MutationAction::UpdateEntity => {
                let target = required_target(item)?;
                let echoed = self
                    .remote
                    .update_entity(item.collection, &target, &item.payload)
                    .await?;
                Ok(match echoed {
                    Some(rec) => Confirmation::Replace {
                        cached_id: target,
                        record: CacheRecord::synced(rec.id, item.owner_id, rec.payload),
                    },
                    None => Confirmation::ClearMarker(target),
                })
            }
            MutationAction::DeleteEntity => {
                let target = required_target(item)?;
                self.remote.delete_entity(item.collection, &target).await?;
                Ok(Confirmation::Nothing)
            }
            MutationAction::MarkRead => {
                let target = required_target(item)?;
                self.remote.mark_read(&target).await?;
                Ok(Confirmation::ClearMarker(target))
            }
            MutationAction::UpdatePreferences => {
                let echoed = self
                    .remote
                    .update_preferences(&item.owner_id, &item.payload)
                    .await?;
                Ok(match echoed {
                    Some(rec) => Confirmation::Replace {
                        cached_id: preferences_record_id(&item.owner_id),
                        record: CacheRecord::synced(rec.id, item.owner_id, rec.payload),
                    },
                    None => Confirmation::ClearMarker(preferences_record_id(&item.owner_id)),
                })
            }
        }
    }

    fn apply_confirmation(&self, item: &QueueItem, confirmation: Confirmation) -> StorageResult<()> {
        match confirmation {
            Confirmation::Replace { cached_id, record } => {
                self.cache.replace_id(item.collection, &cached_id, &record)
            }
            Confirmation::ClearMarker(id) => {
                self.cache.set_marker(item.collection, &id, SyncMarker::Synced)
            }
            Confirmation::Nothing => Ok(()),
        }
    }
}

/// Well-known record id of an owner's single preferences document.
pub fn preferences_record_id(owner: &OwnerId) -> RecordId {
    RecordId::new(format!("prefs-{owner}"))
}

fn required_target(item: &QueueItem) -> Result<RecordId, RemoteError> {
    item.target_id.clone().ok_or_else(|| {
        RemoteError::Terminal(format!("queue item {} has no target id", item.id))
    })
}

/// Clears the single-flight flag on every exit path.
struct DrainFlag<'a>(&'a AtomicBool);

impl Drop for DrainFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
