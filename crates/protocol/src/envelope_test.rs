//! Tests for the envelope data model

use super::*;

#[test]
fn test_envelope_type_discriminants() {
    assert_eq!(
        Envelope::log("app", "hello").envelope_type(),
        EnvelopeType::Log
    );
    assert_eq!(
        Envelope::counter("app", "requests", 1).envelope_type(),
        EnvelopeType::Counter
    );
    assert_eq!(
        Envelope::gauge("app", [("cpu", "percentage", 0.5)]).envelope_type(),
        EnvelopeType::Gauge
    );
}

#[test]
fn test_envelope_type_round_trip() {
    for t in [
        EnvelopeType::Log,
        EnvelopeType::Counter,
        EnvelopeType::Gauge,
        EnvelopeType::Timer,
        EnvelopeType::Event,
    ] {
        assert_eq!(EnvelopeType::try_from(t.to_u8()).unwrap(), t);
    }
    assert!(EnvelopeType::try_from(255).is_err());
}

#[test]
fn test_validate_accepts_well_formed() {
    assert!(Envelope::log("app", "hello").validate().is_ok());
    assert!(Envelope::counter("app", "requests", 1).validate().is_ok());
    assert!(
        Envelope::gauge("app", [("cpu", "percentage", 0.5)])
            .validate()
            .is_ok()
    );
}

#[test]
fn test_validate_rejects_empty_counter_name() {
    let envelope = Envelope::counter("app", "", 1);
    assert!(envelope.validate().is_err());
}

#[test]
fn test_validate_rejects_empty_gauge() {
    let envelope = Envelope {
        source_id: "app".into(),
        instance_id: String::new(),
        timestamp: 0,
        tags: Default::default(),
        message: Message::Gauge(Gauge::default()),
    };
    assert!(envelope.validate().is_err());
}

#[test]
fn test_tag_fingerprint_ignores_insertion_order() {
    let a = Envelope::counter("app", "requests", 1)
        .with_tag("deployment", "prod")
        .with_tag("job", "router")
        .with_tag("index", "0");
    let b = Envelope::counter("app", "requests", 1)
        .with_tag("index", "0")
        .with_tag("job", "router")
        .with_tag("deployment", "prod");

    assert_eq!(a.tag_fingerprint(), b.tag_fingerprint());
}

#[test]
fn test_tag_fingerprint_distinguishes_values() {
    let a = Envelope::counter("app", "requests", 1).with_tag("job", "router");
    let b = Envelope::counter("app", "requests", 1).with_tag("job", "cell");

    assert_ne!(a.tag_fingerprint(), b.tag_fingerprint());
}

#[test]
fn test_tag_fingerprint_distinguishes_value_types() {
    let a = Envelope::counter("app", "requests", 1).with_tag("index", TagValue::Text("1".into()));
    let b = Envelope::counter("app", "requests", 1).with_tag("index", TagValue::Int(1));

    assert_ne!(a.tag_fingerprint(), b.tag_fingerprint());
}

#[test]
fn test_builder_helpers() {
    let envelope = Envelope::log("app-1", "payload")
        .with_instance_id("3")
        .with_timestamp(42)
        .with_tag("origin", "some-origin");

    assert_eq!(envelope.source_id, "app-1");
    assert_eq!(envelope.instance_id, "3");
    assert_eq!(envelope.timestamp, 42);
    assert_eq!(
        envelope.tags.get("origin"),
        Some(&TagValue::Text("some-origin".into()))
    );
}
