//! Connectivity monitoring.
//!
//! The monitor is a thin wrapper over a watch channel. Platform glue calls
//! [`NetworkMonitor::set_online`] when the environment's connectivity
//! signal fires; the sync service watches for offline→online edges to
//! trigger a drain. The monitor itself performs no retry logic.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Observes connectivity transitions and exposes an online/offline signal.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Creates a monitor that starts online.
    pub fn online() -> Self {
        Self::new(true)
    }

    /// Creates a monitor that starts offline.
    pub fn offline() -> Self {
        Self::new(false)
    }

    /// Current connectivity as last reported by the platform.
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Records a platform connectivity signal. Subscribers are only
    /// notified on actual transitions.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
    }

    /// Subscribes to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl std::fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("online", &self.is_online())
            .finish()
    }
}
