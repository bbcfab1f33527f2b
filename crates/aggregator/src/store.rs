//! Container-metric retention
//!
//! The aggregator keeps the most recent container-metric envelope per
//! `(source_id, instance_id)` so the query surface can answer without
//! replaying the stream. A container metric is a gauge carrying the
//! `cpu`, `memory`, and `disk` measurements; other gauges are not
//! retained.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use carrier_protocol::{Envelope, Message};

/// Latest container-metric envelope per source and instance
#[derive(Debug, Default)]
pub struct ContainerMetricStore {
    inner: RwLock<HashMap<String, HashMap<String, Arc<Envelope>>>>,
}

impl ContainerMetricStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain `envelope` if it is a container metric
    pub fn update(&self, envelope: &Arc<Envelope>) {
        if !is_container_metric(envelope) {
            return;
        }
        self.inner
            .write()
            .entry(envelope.source_id.clone())
            .or_default()
            .insert(envelope.instance_id.clone(), Arc::clone(envelope));
    }

    /// Latest retained envelopes for a source, one per instance
    pub fn get(&self, source_id: &str) -> Vec<Envelope> {
        self.inner
            .read()
            .get(source_id)
            .map(|instances| instances.values().map(|e| (**e).clone()).collect())
            .unwrap_or_default()
    }

    /// Number of sources with retained metrics
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check whether anything is retained
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

fn is_container_metric(envelope: &Envelope) -> bool {
    match &envelope.message {
        Message::Gauge(gauge) => ["cpu", "memory", "disk"]
            .iter()
            .all(|key| gauge.metrics.contains_key(*key)),
        _ => false,
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
