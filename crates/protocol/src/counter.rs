//! Per-key counter aggregation
//!
//! Counter envelopes with the same name and tag set are summed within
//! a batching window and emitted as a single envelope carrying the
//! accumulated delta. The key is `(name, tag fingerprint)`; the tag
//! fingerprint is canonical under insertion order because envelope
//! tags are sorted by key.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::envelope::{Envelope, Message};

/// Accumulates counter envelopes by `(name, tags)` key
///
/// The first envelope seen for a key is kept as the template for the
/// emitted envelope; only the delta is replaced at flush time.
#[derive(Debug, Default)]
pub struct CounterAggregator {
    entries: HashMap<u64, (Envelope, u64)>,
}

impl CounterAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a counter envelope to the current window
    ///
    /// Non-counter envelopes are returned unchanged so the caller can
    /// forward them immediately.
    pub fn add(&mut self, envelope: Envelope) -> Option<Envelope> {
        let delta = match &envelope.message {
            Message::Counter(counter) => counter.delta,
            _ => return Some(envelope),
        };

        let key = aggregation_key(&envelope);
        self.entries
            .entry(key)
            .and_modify(|(_, total)| *total += delta)
            .or_insert((envelope, delta));
        None
    }

    /// Emit one envelope per distinct key with the accumulated delta
    /// and reset the window
    pub fn flush(&mut self) -> Vec<Envelope> {
        self.entries
            .drain()
            .map(|(_, (mut envelope, total))| {
                if let Message::Counter(counter) = &mut envelope.message {
                    counter.delta = total;
                }
                envelope
            })
            .collect()
    }

    /// Number of distinct keys in the current window
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the current window is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn aggregation_key(envelope: &Envelope) -> u64 {
    let mut hasher = DefaultHasher::new();
    if let Message::Counter(counter) = &envelope.message {
        counter.name.hash(&mut hasher);
    }
    envelope.source_id.hash(&mut hasher);
    hasher.write_u64(envelope.tag_fingerprint());
    hasher.finish()
}

#[cfg(test)]
#[path = "counter_test.rs"]
mod tests;
