//! Canonical envelope data model
//!
//! The `Envelope` is the unit of transport for the whole pipeline. The
//! core only inspects the routing fields (`source_id`, the message
//! variant, tags); log payloads stay opaque bytes end to end.
//!
//! Tags live in a `BTreeMap` so that every iteration over them is in
//! sorted key order. Counter fingerprinting relies on that: two
//! envelopes whose tags were inserted in different orders still hash
//! to the same key.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use bytes::Bytes;

use crate::error::{ProtocolError, Result};

/// A typed tag value
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl TagValue {
    /// Render the value for logging and exposition
    pub fn as_display_string(&self) -> String {
        match self {
            TagValue::Text(s) => s.clone(),
            TagValue::Int(i) => i.to_string(),
            TagValue::Float(f) => f.to_string(),
            TagValue::Bool(b) => b.to_string(),
        }
    }
}

impl Hash for TagValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            TagValue::Text(s) => {
                state.write_u8(0);
                s.hash(state);
            }
            TagValue::Int(i) => {
                state.write_u8(1);
                i.hash(state);
            }
            TagValue::Float(f) => {
                state.write_u8(2);
                f.to_bits().hash(state);
            }
            TagValue::Bool(b) => {
                state.write_u8(3);
                b.hash(state);
            }
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

/// Whether a log line came from stdout or stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Out,
    Err,
}

/// Log message with an opaque payload
#[derive(Debug, Clone, PartialEq)]
pub struct Log {
    pub payload: Bytes,
    pub log_type: LogType,
}

/// Monotonically increasing counter delta
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub name: String,
    pub delta: u64,
}

/// A single gauge measurement
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeValue {
    pub unit: String,
    pub value: f64,
}

/// A set of named gauge measurements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Gauge {
    pub metrics: BTreeMap<String, GaugeValue>,
}

/// Duration measurement with explicit start/stop nanosecond stamps
#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub name: String,
    pub start: i64,
    pub stop: i64,
}

/// Free-form event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub title: String,
    pub body: String,
}

/// The tagged message variant carried by an envelope
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Log(Log),
    Counter(Counter),
    Gauge(Gauge),
    Timer(Timer),
    Event(Event),
}

/// Discriminant of the message variant, used by type filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    Log,
    Counter,
    Gauge,
    Timer,
    Event,
}

impl EnvelopeType {
    /// Wire discriminant
    pub fn to_u8(self) -> u8 {
        match self {
            EnvelopeType::Log => 0,
            EnvelopeType::Counter => 1,
            EnvelopeType::Gauge => 2,
            EnvelopeType::Timer => 3,
            EnvelopeType::Event => 4,
        }
    }
}

impl TryFrom<u8> for EnvelopeType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            0 => Ok(EnvelopeType::Log),
            1 => Ok(EnvelopeType::Counter),
            2 => Ok(EnvelopeType::Gauge),
            3 => Ok(EnvelopeType::Timer),
            4 => Ok(EnvelopeType::Event),
            _ => Err(ProtocolError::Malformed(format!(
                "unknown envelope type: {v}"
            ))),
        }
    }
}

/// The unit of transport
///
/// Envelopes are immutable after ingress; the only in-core mutation is
/// tag decoration at the sender's egress stage before the envelope
/// leaves the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Producing application or component, may be empty
    pub source_id: String,
    /// Producing instance, may be empty
    pub instance_id: String,
    /// Monotonic nanoseconds, preserved verbatim, never used for ordering
    pub timestamp: i64,
    /// Typed decoration tags, sorted by key
    pub tags: BTreeMap<String, TagValue>,
    /// The message variant
    pub message: Message,
}

impl Envelope {
    /// Create a log envelope with the given payload
    pub fn log(source_id: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            source_id: source_id.into(),
            instance_id: String::new(),
            timestamp: 0,
            tags: BTreeMap::new(),
            message: Message::Log(Log {
                payload: payload.into(),
                log_type: LogType::Out,
            }),
        }
    }

    /// Create a counter envelope with the given delta
    pub fn counter(source_id: impl Into<String>, name: impl Into<String>, delta: u64) -> Self {
        Self {
            source_id: source_id.into(),
            instance_id: String::new(),
            timestamp: 0,
            tags: BTreeMap::new(),
            message: Message::Counter(Counter {
                name: name.into(),
                delta,
            }),
        }
    }

    /// Create a gauge envelope from `(name, unit, value)` triples
    pub fn gauge<I, S>(source_id: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: Into<String>,
    {
        let metrics = metrics
            .into_iter()
            .map(|(name, unit, value)| {
                (
                    name.into(),
                    GaugeValue {
                        unit: unit.into(),
                        value,
                    },
                )
            })
            .collect();
        Self {
            source_id: source_id.into(),
            instance_id: String::new(),
            timestamp: 0,
            tags: BTreeMap::new(),
            message: Message::Gauge(Gauge { metrics }),
        }
    }

    /// Set the instance id
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    /// Set the timestamp
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The message discriminant
    #[inline]
    pub fn envelope_type(&self) -> EnvelopeType {
        match self.message {
            Message::Log(_) => EnvelopeType::Log,
            Message::Counter(_) => EnvelopeType::Counter,
            Message::Gauge(_) => EnvelopeType::Gauge,
            Message::Timer(_) => EnvelopeType::Timer,
            Message::Event(_) => EnvelopeType::Event,
        }
    }

    /// Check the envelope against the schema rules the ingress surface
    /// enforces. Failing envelopes are counted and skipped, never
    /// surfaced to the peer.
    pub fn validate(&self) -> Result<()> {
        match &self.message {
            Message::Counter(c) if c.name.is_empty() => Err(ProtocolError::MalformedEnvelope(
                "counter with empty name".into(),
            )),
            Message::Timer(t) if t.name.is_empty() => Err(ProtocolError::MalformedEnvelope(
                "timer with empty name".into(),
            )),
            Message::Gauge(g) if g.metrics.is_empty() => Err(ProtocolError::MalformedEnvelope(
                "gauge with no metrics".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Fingerprint of the tag set, canonical under tag insertion order
    ///
    /// `BTreeMap` iteration is sorted by key, so logically identical
    /// tag sets always produce the same fingerprint.
    pub fn tag_fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for (key, value) in &self.tags {
            key.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
#[path = "envelope_test.rs"]
mod tests;
