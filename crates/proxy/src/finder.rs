//! Static upstream finder
//!
//! Holds a fixed address set and exposes it as a next-addresses
//! subscription so the connector reacts to fleet changes the same way
//! it would with a dynamic discovery backend. The static variant
//! yields the set once; `next` then pends until `stop`.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Fixed upstream address set
#[derive(Debug)]
pub struct StaticFinder {
    addrs: Vec<String>,
    yielded: AtomicBool,
    stop: CancellationToken,
}

impl StaticFinder {
    /// Create a finder over a fixed address set
    pub fn new(addrs: Vec<String>) -> Self {
        Self {
            addrs,
            yielded: AtomicBool::new(false),
            stop: CancellationToken::new(),
        }
    }

    /// The configured addresses
    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    /// Next address set
    ///
    /// Yields the configured set once, then pends until `stop` and
    /// returns `None` so watchers unwind.
    pub async fn next(&self) -> Option<Vec<String>> {
        if !self.yielded.swap(true, Ordering::AcqRel) {
            return Some(self.addrs.clone());
        }
        self.stop.cancelled().await;
        None
    }

    /// Release every pending `next` caller
    pub fn stop(&self) {
        self.stop.cancel();
    }
}

#[cfg(test)]
#[path = "finder_test.rs"]
mod tests;
