//! Connection manager
//!
//! Owns at most one live upstream stream. A failed or missing stream
//! never blocks the caller: the send is dropped and a single
//! background reconnect starts. Each manager carries a randomized TTL
//! in `[base, base + jitter]`; once a stream outlives it, the manager
//! closes it and reopens on next use, so no producer stays pinned to a
//! degraded peer and reconnects never synchronize across the fleet.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use carrier_metrics::Counter;
use carrier_protocol::{Stream, WireMessage, write_frame};

use crate::connector::Connector;
use crate::error::{Result, SenderError};

/// Default stream lifetime base
pub const DEFAULT_BASE_TTL: Duration = Duration::from_millis(100_000);

/// Default TTL jitter upper bound
pub const DEFAULT_TTL_JITTER: Duration = Duration::from_millis(1_000);

/// Conn manager configuration
#[derive(Debug, Clone)]
pub struct ConnConfig {
    /// Minimum stream lifetime
    pub base_ttl: Duration,

    /// Random addition to the lifetime, drawn once per manager
    pub ttl_jitter: Duration,

    /// Wait between reconnect attempts
    pub retry_interval: Duration,

    /// Per-frame write timeout
    pub write_timeout: Duration,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            base_ttl: DEFAULT_BASE_TTL,
            ttl_jitter: DEFAULT_TTL_JITTER,
            retry_interval: Duration::from_secs(1),
            write_timeout: Duration::from_secs(5),
        }
    }
}

struct Live {
    stream: Stream,
    opened_at: Instant,
}

/// Owner of one long-lived upstream stream with a bounded lifetime
pub struct ConnManager {
    connector: Arc<Connector>,
    config: ConnConfig,
    ttl: Duration,
    live: Mutex<Option<Live>>,
    has_stream: AtomicBool,
    reconnecting: AtomicBool,
    recycles: Counter,
    cancel: CancellationToken,
}

impl ConnManager {
    /// Create a manager; the TTL is drawn once from
    /// `[base, base + jitter]`
    pub fn new(connector: Arc<Connector>, config: ConnConfig) -> Arc<Self> {
        let jitter_ms = config.ttl_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        let ttl = config.base_ttl + jitter;

        let manager = Arc::new(Self {
            connector,
            config,
            ttl,
            live: Mutex::new(None),
            has_stream: AtomicBool::new(false),
            reconnecting: AtomicBool::new(false),
            recycles: Counter::new(),
            cancel: CancellationToken::new(),
        });

        // Establish the first stream eagerly in the background
        manager.spawn_reconnect();
        manager
    }

    /// Whether a live stream is currently held
    pub fn is_live(&self) -> bool {
        self.has_stream.load(Ordering::Relaxed)
    }

    /// Times this manager closed a stream (TTL expiry or write failure)
    pub fn recycle_count(&self) -> u64 {
        self.recycles.get()
    }

    /// Send one frame on the live stream
    ///
    /// Never blocks waiting for a connection: with no live stream the
    /// frame is dropped, a background reconnect starts, and the caller
    /// sees `NoLiveStream`.
    pub async fn try_send(self: &Arc<Self>, frame: &WireMessage) -> Result<()> {
        let mut guard = self.live.lock().await;

        let Some(live) = guard.as_mut() else {
            drop(guard);
            self.spawn_reconnect();
            return Err(SenderError::NoLiveStream);
        };

        if live.opened_at.elapsed() >= self.ttl {
            debug!(ttl = ?self.ttl, "stream outlived its ttl, recycling");
            *guard = None;
            self.has_stream.store(false, Ordering::Relaxed);
            self.recycles.inc();
            drop(guard);
            self.spawn_reconnect();
            return Err(SenderError::NoLiveStream);
        }

        match timeout(self.config.write_timeout, write_frame(&mut live.stream, frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(error = %e, "write failed, marking stream dead");
                *guard = None;
                self.has_stream.store(false, Ordering::Relaxed);
                self.recycles.inc();
                drop(guard);
                self.spawn_reconnect();
                Err(SenderError::NoLiveStream)
            }
            Err(_) => {
                debug!("write timed out, marking stream dead");
                *guard = None;
                self.has_stream.store(false, Ordering::Relaxed);
                self.recycles.inc();
                drop(guard);
                self.spawn_reconnect();
                Err(SenderError::NoLiveStream)
            }
        }
    }

    /// Close the stream and stop reconnecting
    pub async fn close(&self) {
        self.cancel.cancel();
        *self.live.lock().await = None;
        self.has_stream.store(false, Ordering::Relaxed);
    }

    /// Start one background reconnect, if none is in flight
    fn spawn_reconnect(self: &Arc<Self>) {
        if self.cancel.is_cancelled() || self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if manager.cancel.is_cancelled() {
                    break;
                }
                match manager.connector.connect().await {
                    Ok(stream) => {
                        *manager.live.lock().await = Some(Live {
                            stream,
                            opened_at: Instant::now(),
                        });
                        manager.has_stream.store(true, Ordering::Relaxed);
                        break;
                    }
                    Err(e) => {
                        debug!(error = %e, "reconnect attempt failed");
                        tokio::select! {
                            _ = manager.cancel.cancelled() => break,
                            _ = tokio::time::sleep(manager.config.retry_interval) => {}
                        }
                    }
                }
            }
            manager.reconnecting.store(false, Ordering::Release);
        });
    }
}

#[cfg(test)]
#[path = "conn_test.rs"]
mod tests;
