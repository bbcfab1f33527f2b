//! Tests for v1 conversion

use super::*;
use crate::envelope::{EnvelopeType, Message, TagValue};

fn legacy(event: LegacyEvent) -> LegacyEnvelope {
    LegacyEnvelope {
        origin: "router".into(),
        deployment: "cf".into(),
        job: "router".into(),
        index: "2".into(),
        ip: "10.0.0.1".into(),
        timestamp: 99,
        event,
    }
}

#[test]
fn test_log_message_conversion() {
    let envelope = legacy(LegacyEvent::LogMessage {
        app_id: "app-1".into(),
        message: Bytes::from_static(b"hello"),
        message_type: LogType::Err,
    })
    .into_envelope();

    assert_eq!(envelope.source_id, "app-1");
    assert_eq!(envelope.timestamp, 99);
    match &envelope.message {
        Message::Log(log) => {
            assert_eq!(&log.payload[..], b"hello");
            assert_eq!(log.log_type, LogType::Err);
        }
        other => panic!("expected log, got {other:?}"),
    }
}

#[test]
fn test_counter_event_conversion() {
    let envelope = legacy(LegacyEvent::CounterEvent {
        name: "requests".into(),
        delta: 7,
    })
    .into_envelope();

    assert_eq!(envelope.source_id, "router");
    assert_eq!(envelope.envelope_type(), EnvelopeType::Counter);
}

#[test]
fn test_value_metric_becomes_single_gauge() {
    let envelope = legacy(LegacyEvent::ValueMetric {
        name: "latency".into(),
        value: 12.5,
        unit: "ms".into(),
    })
    .into_envelope();

    match &envelope.message {
        Message::Gauge(gauge) => {
            assert_eq!(gauge.metrics.len(), 1);
            let metric = &gauge.metrics["latency"];
            assert_eq!(metric.unit, "ms");
            assert_eq!(metric.value, 12.5);
        }
        other => panic!("expected gauge, got {other:?}"),
    }
}

#[test]
fn test_container_metric_conversion() {
    let envelope = legacy(LegacyEvent::ContainerMetric {
        app_id: "some-app".into(),
        instance_index: 3,
        cpu_percentage: 0.25,
        memory_bytes: 1024,
        disk_bytes: 2048,
    })
    .into_envelope();

    assert_eq!(envelope.source_id, "some-app");
    assert_eq!(envelope.instance_id, "3");
    match &envelope.message {
        Message::Gauge(gauge) => {
            assert_eq!(gauge.metrics["cpu"].value, 0.25);
            assert_eq!(gauge.metrics["memory"].value, 1024.0);
            assert_eq!(gauge.metrics["disk"].value, 2048.0);
        }
        other => panic!("expected gauge, got {other:?}"),
    }
}

#[test]
fn test_identity_fields_become_tags() {
    let envelope = legacy(LegacyEvent::CounterEvent {
        name: "requests".into(),
        delta: 1,
    })
    .into_envelope();

    assert_eq!(envelope.tags["origin"], TagValue::Text("router".into()));
    assert_eq!(envelope.tags["deployment"], TagValue::Text("cf".into()));
    assert_eq!(envelope.tags["job"], TagValue::Text("router".into()));
    assert_eq!(envelope.tags["index"], TagValue::Text("2".into()));
    assert_eq!(envelope.tags["ip"], TagValue::Text("10.0.0.1".into()));
}

#[test]
fn test_empty_identity_fields_are_not_tagged() {
    let mut legacy = legacy(LegacyEvent::CounterEvent {
        name: "requests".into(),
        delta: 1,
    });
    legacy.deployment = String::new();
    legacy.ip = String::new();

    let envelope = legacy.into_envelope();
    assert!(!envelope.tags.contains_key("deployment"));
    assert!(!envelope.tags.contains_key("ip"));
}
