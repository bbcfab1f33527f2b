//! Named metric registry
//!
//! Components obtain counter and gauge handles by stable name (plus an
//! optional static tag set) and update them lock-free; the registry
//! owns the name → handle table and renders the text exposition.
//!
//! Exposition lines are prefixed `namespace_subsystem_`, so the
//! subscription gauge of a reverse log proxy renders as
//! `loggregator_reverseLogProxy_subscriptionCount`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Counter, Gauge};

/// Registry of named counters and gauges
#[derive(Debug)]
pub struct MetricsRegistry {
    namespace: String,
    subsystem: String,
    counters: RwLock<BTreeMap<String, Arc<Counter>>>,
    gauges: RwLock<BTreeMap<String, Arc<Gauge>>>,
}

impl MetricsRegistry {
    /// Create a registry; `namespace` and `subsystem` prefix every
    /// exposition line
    pub fn new(namespace: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            counters: RwLock::new(BTreeMap::new()),
            gauges: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get or create a counter by name
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        self.counter_with_tags(name, &[])
    }

    /// Get or create a counter by name and static tag set
    pub fn counter_with_tags(&self, name: &str, tags: &[(&str, &str)]) -> Arc<Counter> {
        let key = metric_key(name, tags);
        if let Some(counter) = self.counters.read().get(&key) {
            return Arc::clone(counter);
        }
        Arc::clone(
            self.counters
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Counter::new())),
        )
    }

    /// Get or create a gauge by name
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        let key = metric_key(name, &[]);
        if let Some(gauge) = self.gauges.read().get(&key) {
            return Arc::clone(gauge);
        }
        Arc::clone(
            self.gauges
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(Gauge::new())),
        )
    }

    /// Sum of all counters registered under `name`, across tag sets
    pub fn counter_total(&self, name: &str) -> u64 {
        let prefix_plain = name.to_string();
        let prefix_tagged = format!("{name}{{");
        self.counters
            .read()
            .iter()
            .filter(|(key, _)| **key == prefix_plain || key.starts_with(&prefix_tagged))
            .map(|(_, counter)| counter.get())
            .sum()
    }

    /// Render the text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut out = String::new();
        let prefix = format!("{}_{}_", self.namespace, self.subsystem);

        for (key, counter) in self.counters.read().iter() {
            let _ = writeln!(out, "{prefix}{key} {}", counter.get());
        }
        for (key, gauge) in self.gauges.read().iter() {
            let _ = writeln!(out, "{prefix}{key} {}", gauge.get());
        }
        out
    }
}

fn metric_key(name: &str, tags: &[(&str, &str)]) -> String {
    if tags.is_empty() {
        return name.to_string();
    }
    // Sorted tags so logically identical metrics share one series
    let sorted: BTreeMap<&str, &str> = tags.iter().copied().collect();
    let rendered: Vec<String> = sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    format!("{name}{{{}}}", rendered.join(","))
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
