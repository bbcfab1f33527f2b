//! Metric emitter
//!
//! Periodically converts the proxy's own counters into counter
//! envelopes and sends them to a local agent over one managed
//! connection, so the proxy's health shows up in the same pipeline it
//! serves. Deltas are computed against the last emission; idle
//! counters emit nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use carrier_metrics::MetricsRegistry;
use carrier_protocol::{Envelope, WireMessage};
use carrier_sender::{ConnManager, Tagger};

/// Counter names the emitter publishes
const EMITTED_COUNTERS: [&str; 3] = ["ingress", "egress", "dropped"];

/// Emits registry counters as envelopes
pub struct MetricEmitter {
    registry: Arc<MetricsRegistry>,
    manager: Arc<ConnManager>,
    tagger: Tagger,
    interval: Duration,
    source_id: String,
}

impl MetricEmitter {
    /// Create an emitter sending through `manager` every `interval`
    pub fn new(
        registry: Arc<MetricsRegistry>,
        manager: Arc<ConnManager>,
        tagger: Tagger,
        interval: Duration,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            manager,
            tagger,
            interval,
            source_id: source_id.into(),
        }
    }

    /// Emit until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "metric emitter starting"
        );

        let mut last: HashMap<&'static str, u64> = HashMap::new();
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first
        // emission covers a full interval.
        timer.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => self.emit(&mut last).await,
            }
        }

        info!("metric emitter stopped");
    }

    async fn emit(&self, last: &mut HashMap<&'static str, u64>) {
        let mut envelopes = Vec::new();

        for name in EMITTED_COUNTERS {
            let total = self.registry.counter_total(name);
            let previous = last.insert(name, total).unwrap_or(0);
            let delta = total.saturating_sub(previous);
            if delta == 0 {
                continue;
            }

            let mut envelope = Envelope::counter(&self.source_id, name, delta);
            self.tagger.apply(&mut envelope);
            envelopes.push(envelope);
        }

        if envelopes.is_empty() {
            return;
        }

        let count = envelopes.len();
        if let Err(e) = self
            .manager
            .try_send(&WireMessage::SendBatch(envelopes))
            .await
        {
            debug!(error = %e, count, "metric emission dropped");
        }
    }
}

#[cfg(test)]
#[path = "emitter_test.rs"]
mod tests;
