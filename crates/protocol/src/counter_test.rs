//! Tests for counter aggregation

use super::*;
use crate::envelope::Envelope;

#[test]
fn test_same_key_accumulates() {
    let mut aggregator = CounterAggregator::new();

    for _ in 0..5 {
        let staged = aggregator.add(Envelope::counter("app", "requests", 3));
        assert!(staged.is_none());
    }

    let flushed = aggregator.flush();
    assert_eq!(flushed.len(), 1);
    match &flushed[0].message {
        Message::Counter(counter) => assert_eq!(counter.delta, 15),
        other => panic!("expected counter, got {other:?}"),
    }
}

#[test]
fn test_distinct_names_stay_separate() {
    let mut aggregator = CounterAggregator::new();
    aggregator.add(Envelope::counter("app", "requests", 1));
    aggregator.add(Envelope::counter("app", "failures", 1));

    assert_eq!(aggregator.len(), 2);
    assert_eq!(aggregator.flush().len(), 2);
}

#[test]
fn test_distinct_tags_stay_separate() {
    let mut aggregator = CounterAggregator::new();
    aggregator.add(Envelope::counter("app", "requests", 1).with_tag("job", "router"));
    aggregator.add(Envelope::counter("app", "requests", 1).with_tag("job", "cell"));

    assert_eq!(aggregator.flush().len(), 2);
}

#[test]
fn test_tag_order_does_not_split_keys() {
    let mut aggregator = CounterAggregator::new();
    aggregator.add(
        Envelope::counter("app", "requests", 1)
            .with_tag("a", "1")
            .with_tag("b", "2"),
    );
    aggregator.add(
        Envelope::counter("app", "requests", 1)
            .with_tag("b", "2")
            .with_tag("a", "1"),
    );

    let flushed = aggregator.flush();
    assert_eq!(flushed.len(), 1);
    match &flushed[0].message {
        Message::Counter(counter) => assert_eq!(counter.delta, 2),
        other => panic!("expected counter, got {other:?}"),
    }
}

#[test]
fn test_non_counter_passes_through() {
    let mut aggregator = CounterAggregator::new();
    let staged = aggregator.add(Envelope::log("app", "hello"));
    assert!(staged.is_some());
    assert!(aggregator.is_empty());
}

#[test]
fn test_flush_resets_window() {
    let mut aggregator = CounterAggregator::new();
    aggregator.add(Envelope::counter("app", "requests", 5));

    assert_eq!(aggregator.flush().len(), 1);
    assert!(aggregator.is_empty());
    assert!(aggregator.flush().is_empty());
}
