//! SQLite storage layer for the subtrack sync core.
//!
//! Provides the durable pieces the sync layer builds on:
//!
//! - [`CacheStore`] — multi-collection cache of entity records keyed by
//!   `(collection, id)` with a secondary index by owner
//! - [`QueueStore`] — the ordered, durable mutation queue
//! - [`LeaseStore`] — a timestamped leader lease so only one process
//!   instance drains a shared database at a time
//! - [`SharedCacheStore`] — idempotent lazy opening: racing openers all
//!   resolve to the same handle
//!
//! Each store owns its own connection behind a mutex; every public call is
//! a single transaction, so individual puts and deletes are atomic. Schema
//! creation uses `IF NOT EXISTS` throughout and is safe to run repeatedly.

mod cache_store;
mod error;
mod lease_store;
mod queue_store;
mod shared;

pub use cache_store::CacheStore;
pub use error::{StorageError, StorageResult};
pub use lease_store::{LeaseStore, DEFAULT_LEASE_TTL};
pub use queue_store::QueueStore;
pub use shared::SharedCacheStore;
