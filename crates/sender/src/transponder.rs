//! Transponder: local diode → decorated batches → pool
//!
//! The single reader of the producer's local diode. Every envelope is
//! tag-decorated; counters accumulate per `(name, tags)` key while
//! everything else is staged directly. The stage flushes as one v2
//! batch when it reaches the batch size or when the window elapses,
//! whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use carrier_diode::Diode;
use carrier_metrics::Counter;
use carrier_protocol::{CounterAggregator, Envelope, WireMessage};

use crate::pool::ClientPool;
use crate::tagger::Tagger;

/// Default flush batch size
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default flush window
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Transponder configuration
#[derive(Debug, Clone)]
pub struct TransponderConfig {
    /// Envelopes per outgoing batch
    pub batch_size: usize,

    /// Flush window for partial batches
    pub flush_interval: Duration,
}

impl Default for TransponderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Drains the local diode into the upstream pool
pub struct Transponder {
    diode: Arc<Diode<Envelope>>,
    pool: Arc<ClientPool>,
    tagger: Tagger,
    config: TransponderConfig,
    egress: Arc<Counter>,
}

impl Transponder {
    /// Create a transponder
    pub fn new(
        diode: Arc<Diode<Envelope>>,
        pool: Arc<ClientPool>,
        tagger: Tagger,
        config: TransponderConfig,
        egress: Arc<Counter>,
    ) -> Self {
        Self {
            diode,
            pool,
            tagger,
            config,
            egress,
        }
    }

    /// Run until cancelled, flushing any staged envelopes on the way out
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "transponder starting"
        );

        let mut staged: Vec<Envelope> = Vec::with_capacity(self.config.batch_size);
        let mut counters = CounterAggregator::new();
        let mut flush_timer = tokio::time::interval(self.config.flush_interval);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.flush(&mut staged, &mut counters).await;
                    break;
                }
                _ = flush_timer.tick() => {
                    self.flush(&mut staged, &mut counters).await;
                }
                envelope = self.diode.next() => {
                    let mut envelope = envelope;
                    self.tagger.apply(&mut envelope);

                    // Counters coalesce until flush; everything else
                    // is staged as-is.
                    if let Some(envelope) = counters.add(envelope) {
                        staged.push(envelope);
                    }

                    if staged.len() + counters.len() >= self.config.batch_size {
                        self.flush(&mut staged, &mut counters).await;
                    }
                }
            }
        }

        info!("transponder stopped");
    }

    async fn flush(&self, staged: &mut Vec<Envelope>, counters: &mut CounterAggregator) {
        staged.extend(counters.flush());
        if staged.is_empty() {
            return;
        }

        let batch = std::mem::take(staged);
        let count = batch.len() as u64;
        let frame = WireMessage::SendBatch(batch);

        match self.pool.send(&frame).await {
            Ok(()) => self.egress.add(count),
            Err(e) => debug!(error = %e, count, "batch dropped"),
        }
    }
}

#[cfg(test)]
#[path = "transponder_test.rs"]
mod tests;
