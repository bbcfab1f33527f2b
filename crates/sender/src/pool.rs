//! Client pool
//!
//! A fixed set of conn managers with round-robin dispatch. Each send
//! goes to the next manager holding a live stream; with none live the
//! pick falls back to any manager (whose failed send kicks off its
//! reconnect) and the envelope is dropped and counted. Sends are never
//! retried; upstream delivery is best effort by design.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use carrier_metrics::Counter;
use carrier_protocol::WireMessage;

use crate::conn::{ConnConfig, ConnManager};
use crate::connector::Connector;
use crate::error::{Result, SenderError};

/// Default number of conn managers
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Fixed-size pool of conn managers
pub struct ClientPool {
    managers: Vec<Arc<ConnManager>>,
    next: AtomicUsize,
    dropped: Arc<Counter>,
}

impl ClientPool {
    /// Create a pool over existing managers
    pub fn new(managers: Vec<Arc<ConnManager>>, dropped: Arc<Counter>) -> Self {
        assert!(!managers.is_empty(), "pool needs at least one manager");
        Self {
            managers,
            next: AtomicUsize::new(0),
            dropped,
        }
    }

    /// Create a pool of `size` managers sharing one connector
    pub fn with_connector(
        connector: Arc<Connector>,
        size: usize,
        config: ConnConfig,
        dropped: Arc<Counter>,
    ) -> Self {
        let managers = (0..size.max(1))
            .map(|_| ConnManager::new(Arc::clone(&connector), config.clone()))
            .collect();
        Self::new(managers, dropped)
    }

    /// Number of managers currently holding a live stream
    pub fn live_count(&self) -> usize {
        self.managers.iter().filter(|m| m.is_live()).count()
    }

    /// Send one frame via the next manager
    ///
    /// Drops (and counts) the frame when no manager can take it.
    pub async fn send(&self, frame: &WireMessage) -> Result<()> {
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let len = self.managers.len();

        // Round-robin over live managers, falling back to any so a
        // dead pick still triggers its reconnect.
        let pick = (0..len)
            .map(|offset| &self.managers[(start + offset) % len])
            .find(|m| m.is_live())
            .unwrap_or(&self.managers[start % len]);

        match pick.try_send(frame).await {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped.inc();
                Err(SenderError::NoLiveStream)
            }
        }
    }

    /// Close every manager
    pub async fn close(&self) {
        for manager in &self.managers {
            manager.close().await;
        }
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
