//! Tests for the subscription registry

use super::*;
use carrier_protocol::{EnvelopeType, Message};

fn registry() -> Arc<SubscriptionRegistry> {
    Arc::new(SubscriptionRegistry::new(
        Arc::new(Gauge::new()),
        Arc::new(Counter::new()),
    ))
}

fn firehose(shard: &str) -> SubscriptionRequest {
    SubscriptionRequest::new().with_shard(shard)
}

#[test]
fn test_invalid_filter_is_rejected_and_not_registered() {
    let registry = registry();
    let request = SubscriptionRequest::new()
        .with_filter(Filter::SourceIdAndType(String::new(), EnvelopeType::Log));

    let err = registry.register(&request).unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid request: cannot have type filter without source id"
    );
    assert_eq!(registry.count(), 0);
}

#[test]
fn test_firehose_receives_everything() {
    let registry = registry();
    let subscription = registry.register(&firehose("")).unwrap();

    registry.fanout(Arc::new(Envelope::log("app-1", "a")));
    registry.fanout(Arc::new(Envelope::counter("app-2", "requests", 1)));

    assert_eq!(subscription.try_next().unwrap().source_id, "app-1");
    assert_eq!(subscription.try_next().unwrap().source_id, "app-2");
}

#[test]
fn test_source_filter_selects_matching_envelopes() {
    let registry = registry();
    let request =
        SubscriptionRequest::new().with_filter(Filter::SourceId("app-1".into()));
    let subscription = registry.register(&request).unwrap();

    registry.fanout(Arc::new(Envelope::log("app-1", "a")));
    registry.fanout(Arc::new(Envelope::log("app-2", "b")));
    registry.fanout(Arc::new(Envelope::log("app-1", "c")));

    assert!(subscription.try_next().is_some());
    let second = subscription.try_next().unwrap();
    match &second.message {
        Message::Log(log) => assert_eq!(&log.payload[..], b"c"),
        other => panic!("expected log, got {other:?}"),
    }
    assert!(subscription.try_next().is_none());
}

#[test]
fn test_shard_members_split_the_stream_round_robin() {
    let registry = registry();
    let a = registry.register(&firehose("abc")).unwrap();
    let b = registry.register(&firehose("abc")).unwrap();

    let published = 10;
    for i in 0..published {
        registry.fanout(Arc::new(Envelope::log("app", format!("{i}"))));
    }

    let received_a = std::iter::from_fn(|| a.try_next()).count();
    let received_b = std::iter::from_fn(|| b.try_next()).count();

    assert_eq!(received_a + received_b, published);
    assert_eq!(received_a, published / 2);
    assert_eq!(received_b, published / 2);
}

#[test]
fn test_distinct_shards_each_get_the_full_stream() {
    let registry = registry();
    let a = registry.register(&firehose("abc")).unwrap();
    let b = registry.register(&firehose("def")).unwrap();

    let published = 7;
    for i in 0..published {
        registry.fanout(Arc::new(Envelope::log("app", format!("{i}"))));
    }

    assert_eq!(std::iter::from_fn(|| a.try_next()).count(), published);
    assert_eq!(std::iter::from_fn(|| b.try_next()).count(), published);
}

#[test]
fn test_empty_shard_ids_do_not_compete() {
    let registry = registry();
    let a = registry.register(&firehose("")).unwrap();
    let b = registry.register(&firehose("")).unwrap();

    registry.fanout(Arc::new(Envelope::log("app", "x")));

    assert!(a.try_next().is_some());
    assert!(b.try_next().is_some());
}

#[test]
fn test_shard_join_with_mismatched_filter_is_rejected() {
    let registry = registry();
    let _a = registry
        .register(
            &SubscriptionRequest::new()
                .with_shard("abc")
                .with_filter(Filter::SourceId("app-1".into())),
        )
        .unwrap();

    let err = registry
        .register(
            &SubscriptionRequest::new()
                .with_shard("abc")
                .with_filter(Filter::SourceId("app-2".into())),
        )
        .unwrap_err();

    assert!(matches!(err, ProtocolError::InvalidRequest(_)));
    assert_eq!(registry.count(), 1);
}

#[test]
fn test_gauge_tracks_register_and_drop() {
    let gauge = Arc::new(Gauge::new());
    let registry = Arc::new(SubscriptionRegistry::new(
        Arc::clone(&gauge),
        Arc::new(Counter::new()),
    ));

    let a = registry.register(&firehose("abc")).unwrap();
    assert_eq!(gauge.value(), 1.0);

    let b = registry.register(&firehose("def")).unwrap();
    assert_eq!(gauge.value(), 2.0);

    drop(a);
    assert_eq!(gauge.value(), 1.0);
    drop(b);
    assert_eq!(gauge.value(), 0.0);
    assert_eq!(registry.count(), 0);
}

#[test]
fn test_full_queue_drops_and_counts() {
    let dropped = Arc::new(Counter::new());
    let registry = Arc::new(SubscriptionRegistry::with_queue_capacity(
        Arc::new(Gauge::new()),
        Arc::clone(&dropped),
        4,
    ));
    let subscription = registry.register(&firehose("")).unwrap();

    for i in 0..20 {
        registry.fanout(Arc::new(Envelope::log("app", format!("{i}"))));
    }

    assert_eq!(dropped.get(), 16);
    assert_eq!(subscription.dropped(), 16);
    assert_eq!(std::iter::from_fn(|| subscription.try_next()).count(), 4);
}

#[test]
fn test_departed_member_stops_receiving_share() {
    let registry = registry();
    let a = registry.register(&firehose("abc")).unwrap();
    let b = registry.register(&firehose("abc")).unwrap();
    drop(b);

    for i in 0..4 {
        registry.fanout(Arc::new(Envelope::log("app", format!("{i}"))));
    }

    assert_eq!(std::iter::from_fn(|| a.try_next()).count(), 4);
}
