//! Process-identity tag decoration
//!
//! Applied at the egress stage, just before envelopes leave the
//! process. Tags already present on an envelope win; decoration never
//! overwrites what the producer set.

use std::collections::BTreeMap;

use carrier_protocol::{Envelope, TagValue};

/// Decorates envelopes with the process identity
#[derive(Debug, Clone, Default)]
pub struct Tagger {
    tags: BTreeMap<String, TagValue>,
}

impl Tagger {
    /// Create a tagger from arbitrary tags
    pub fn new(tags: BTreeMap<String, TagValue>) -> Self {
        Self { tags }
    }

    /// Create a tagger for the standard identity set; empty fields are
    /// not tagged
    pub fn from_identity(deployment: &str, job: &str, index: &str, ip: &str) -> Self {
        let mut tags = BTreeMap::new();
        for (key, value) in [
            ("deployment", deployment),
            ("job", job),
            ("index", index),
            ("ip", ip),
        ] {
            if !value.is_empty() {
                tags.insert(key.to_string(), TagValue::Text(value.to_string()));
            }
        }
        Self { tags }
    }

    /// Decorate an envelope in place
    pub fn apply(&self, envelope: &mut Envelope) {
        for (key, value) in &self.tags {
            envelope
                .tags
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[cfg(test)]
#[path = "tagger_test.rs"]
mod tests;
