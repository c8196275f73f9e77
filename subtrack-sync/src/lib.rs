//! Offline-first sync core for subtrack.
//!
//! Keeps the client functioning while disconnected from the authoritative
//! backend and reconciles all accumulated local changes once connectivity
//! returns.
//!
//! # Architecture
//!
//! - **Monitor**: watches platform connectivity and exposes online/offline
//!   transitions
//! - **Remote**: narrow CRUD interface onto the authoritative backend, with
//!   failures classified as transient or terminal at the boundary
//! - **Coordinator**: single-flight state machine that drains the mutation
//!   queue, oldest first, with retry/backoff and partial-failure isolation
//! - **Service**: the consumer-facing facade — optimistic enqueue entry
//!   points, status, lifecycle events, maintenance
//!
//! # Sync flow
//!
//! 1. The application enqueues a mutation; the local cache is updated
//!    optimistically (marked `pending_sync`) and the operation is durably
//!    queued in the same call
//! 2. When online — immediately, or on the next reconnect — the coordinator
//!    drains the queue, one item at a time, against the remote service
//! 3. Confirmed items are removed and the cache reconciled with the
//!    authoritative result (creates swap their temporary correlation id for
//!    the remote-assigned id)
//! 4. Transient failures re-queue the item for a later pass; terminal
//!    failures and exhausted retries park it as `failed` until the caller
//!    clears it
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subtrack_store::{CacheStore, LeaseStore, QueueStore};
//! use subtrack_sync::{HttpRemote, HttpRemoteConfig, NetworkMonitor, SyncConfig, SyncService};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = SyncService::new(
//!     Arc::new(CacheStore::open("cache.db")?),
//!     Arc::new(QueueStore::open("queue.db")?),
//!     Arc::new(LeaseStore::open("lease.db")?),
//!     Arc::new(HttpRemote::new(HttpRemoteConfig::default())),
//!     NetworkMonitor::online(),
//!     SyncConfig::default(),
//! );
//! let watcher = service.spawn_auto_drain();
//! # drop(watcher);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
mod monitor;
pub mod remote;
mod service;

pub use coordinator::{
    preferences_record_id, DrainOutcome, SyncConfig, SyncCoordinator, SyncLifecycle,
};
pub use error::{SyncError, SyncResult};
pub use monitor::NetworkMonitor;
pub use remote::{HttpRemote, HttpRemoteConfig, RemoteError, RemoteRecord, RemoteResult, RemoteService};
pub use service::{SyncService, SyncStatus};
