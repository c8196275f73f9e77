//! Idempotent lazy opening of the cache store.

use crate::cache_store::CacheStore;
use crate::error::StorageResult;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

/// Lazily opened, shareable cache store handle.
///
/// Several callers may race to open the cache at startup. All of them must
/// end up with the same handle and a single schema, never two competing
/// initializations. The loser of an open race drops its connection and
/// adopts the winner's; schema creation is `IF NOT EXISTS`, so the extra
/// open is harmless.
pub struct SharedCacheStore {
    path: PathBuf,
    handle: OnceLock<Arc<CacheStore>>,
}

impl SharedCacheStore {
    /// Creates a shared handle for the store at `path` without opening it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            handle: OnceLock::new(),
        }
    }

    /// Returns the store handle, opening it on first use.
    pub fn get_or_open(&self) -> StorageResult<Arc<CacheStore>> {
        if let Some(handle) = self.handle.get() {
            return Ok(handle.clone());
        }
        let opened = Arc::new(CacheStore::open(&self.path)?);
        Ok(self.handle.get_or_init(|| opened).clone())
    }

    /// Returns the handle if already opened.
    pub fn get(&self) -> Option<Arc<CacheStore>> {
        self.handle.get().cloned()
    }
}
