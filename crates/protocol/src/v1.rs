//! Legacy v1 envelope shapes and conversion
//!
//! The first-generation ingress surface carries one event per frame
//! with process identity spread over dedicated fields. Every v1
//! boundary converts to the canonical envelope immediately, so the
//! rest of the pipeline only ever sees canonical form.
//!
//! Conversion rules:
//! - `LogMessage` → `Log`, `source_id` from the application id
//! - `CounterEvent` → `Counter`
//! - `ValueMetric` → `Gauge` with a single metric
//! - `ContainerMetric` → `Gauge` with `cpu`/`memory`/`disk`,
//!   `instance_id` from the instance index
//! - `Error` → `Event`
//!
//! Identity fields (`origin`, `deployment`, `job`, `index`, `ip`)
//! become tags; empty fields are not tagged.

use bytes::Bytes;

use crate::envelope::{
    Counter, Envelope, Event, Gauge, GaugeValue, Log, LogType, Message, Timer,
};

/// Legacy event payload variants
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyEvent {
    LogMessage {
        app_id: String,
        message: Bytes,
        message_type: LogType,
    },
    CounterEvent {
        name: String,
        delta: u64,
    },
    ValueMetric {
        name: String,
        value: f64,
        unit: String,
    },
    ContainerMetric {
        app_id: String,
        instance_index: i64,
        cpu_percentage: f64,
        memory_bytes: u64,
        disk_bytes: u64,
    },
    HttpTimer {
        name: String,
        start: i64,
        stop: i64,
    },
    Error {
        source: String,
        code: i32,
        message: String,
    },
}

/// Legacy v1 envelope: one event plus flattened process identity
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEnvelope {
    pub origin: String,
    pub deployment: String,
    pub job: String,
    pub index: String,
    pub ip: String,
    pub timestamp: i64,
    pub event: LegacyEvent,
}

impl LegacyEnvelope {
    /// Convert to the canonical envelope form
    pub fn into_envelope(self) -> Envelope {
        let (source_id, instance_id, message) = match self.event {
            LegacyEvent::LogMessage {
                app_id,
                message,
                message_type,
            } => (
                app_id,
                String::new(),
                Message::Log(Log {
                    payload: message,
                    log_type: message_type,
                }),
            ),
            LegacyEvent::CounterEvent { name, delta } => (
                self.origin.clone(),
                String::new(),
                Message::Counter(Counter { name, delta }),
            ),
            LegacyEvent::ValueMetric { name, value, unit } => {
                let mut gauge = Gauge::default();
                gauge.metrics.insert(name, GaugeValue { unit, value });
                (self.origin.clone(), String::new(), Message::Gauge(gauge))
            }
            LegacyEvent::ContainerMetric {
                app_id,
                instance_index,
                cpu_percentage,
                memory_bytes,
                disk_bytes,
            } => {
                let mut gauge = Gauge::default();
                gauge.metrics.insert(
                    "cpu".into(),
                    GaugeValue {
                        unit: "percentage".into(),
                        value: cpu_percentage,
                    },
                );
                gauge.metrics.insert(
                    "memory".into(),
                    GaugeValue {
                        unit: "bytes".into(),
                        value: memory_bytes as f64,
                    },
                );
                gauge.metrics.insert(
                    "disk".into(),
                    GaugeValue {
                        unit: "bytes".into(),
                        value: disk_bytes as f64,
                    },
                );
                (app_id, instance_index.to_string(), Message::Gauge(gauge))
            }
            LegacyEvent::HttpTimer { name, start, stop } => (
                self.origin.clone(),
                String::new(),
                Message::Timer(Timer { name, start, stop }),
            ),
            LegacyEvent::Error {
                source,
                code,
                message,
            } => (
                self.origin.clone(),
                String::new(),
                Message::Event(Event {
                    title: source,
                    body: format!("{code}: {message}"),
                }),
            ),
        };

        let mut envelope = Envelope {
            source_id,
            instance_id,
            timestamp: self.timestamp,
            tags: Default::default(),
            message,
        };

        for (key, value) in [
            ("origin", self.origin),
            ("deployment", self.deployment),
            ("job", self.job),
            ("index", self.index),
            ("ip", self.ip),
        ] {
            if !value.is_empty() {
                envelope.tags.insert(key.into(), value.into());
            }
        }

        envelope
    }
}

#[cfg(test)]
#[path = "v1_test.rs"]
mod tests;
