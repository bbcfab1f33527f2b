//! Tests for the container-metric store

use super::*;
use carrier_protocol::Envelope;

fn container_metric(source_id: &str, instance_id: &str, cpu: f64) -> Arc<Envelope> {
    Arc::new(
        Envelope::gauge(
            source_id,
            [
                ("cpu", "percentage", cpu),
                ("memory", "bytes", 1024.0),
                ("disk", "bytes", 2048.0),
            ],
        )
        .with_instance_id(instance_id),
    )
}

#[test]
fn test_retains_latest_per_instance() {
    let store = ContainerMetricStore::new();

    store.update(&container_metric("some-app", "0", 0.1));
    store.update(&container_metric("some-app", "0", 0.9));
    store.update(&container_metric("some-app", "1", 0.5));

    let retained = store.get("some-app");
    assert_eq!(retained.len(), 2);

    let instance_zero = retained.iter().find(|e| e.instance_id == "0").unwrap();
    match &instance_zero.message {
        Message::Gauge(gauge) => assert_eq!(gauge.metrics["cpu"].value, 0.9),
        other => panic!("expected gauge, got {other:?}"),
    }
}

#[test]
fn test_sources_are_isolated() {
    let store = ContainerMetricStore::new();
    store.update(&container_metric("app-a", "0", 0.1));
    store.update(&container_metric("app-b", "0", 0.2));

    assert_eq!(store.get("app-a").len(), 1);
    assert_eq!(store.get("app-b").len(), 1);
    assert!(store.get("app-c").is_empty());
}

#[test]
fn test_ignores_non_container_envelopes() {
    let store = ContainerMetricStore::new();

    store.update(&Arc::new(Envelope::log("some-app", "hello")));
    store.update(&Arc::new(Envelope::counter("some-app", "requests", 1)));
    // A plain value metric is a gauge but not a container metric
    store.update(&Arc::new(Envelope::gauge(
        "some-app",
        [("latency", "ms", 3.0)],
    )));

    assert!(store.is_empty());
    assert!(store.get("some-app").is_empty());
}
