//! End-to-end tests for the reverse log proxy

use super::*;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use carrier_aggregator::{Aggregator, AggregatorConfig};
use carrier_protocol::{
    Envelope, ErrorCode, Message, SubscriptionRequest, TagValue, WireMessage, read_frame,
    write_frame,
};
use carrier_sender::{
    Balancer, ClientPool, ConnConfig, Connector, Tagger, Transponder, TransponderConfig,
};

async fn start_aggregator() -> Aggregator {
    let metrics = Arc::new(MetricsRegistry::new("loggregator", "aggregator"));
    Aggregator::start(AggregatorConfig::default(), metrics, None)
        .await
        .unwrap()
}

async fn start_proxy(upstreams: Vec<String>) -> (Proxy, Arc<MetricsRegistry>) {
    let metrics = Arc::new(MetricsRegistry::new("loggregator", "reverseLogProxy"));
    let proxy = Proxy::start(
        ProxyConfig {
            ingress_addrs: upstreams,
            egress: EgressConfig::default(),
            health_addr: "127.0.0.1:0".into(),
        },
        Arc::clone(&metrics),
        None,
        None,
    )
    .await
    .unwrap();
    (proxy, metrics)
}

async fn subscribe(proxy: &Proxy, request: SubscriptionRequest) -> TcpStream {
    let mut stream = TcpStream::connect(proxy.egress_addr()).await.unwrap();
    write_frame(&mut stream, &WireMessage::Subscribe(request))
        .await
        .unwrap();
    stream
}

async fn wait_for_upstream_subscription(aggregator: &Aggregator) {
    for _ in 0..500 {
        if aggregator.registry().count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("proxy never subscribed upstream");
}

async fn http_get(addr: std::net::SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_firehose_through_proxy_receives_published_envelope() {
    let aggregator = start_aggregator().await;
    let (proxy, _metrics) = start_proxy(vec![aggregator.egress_addr().to_string()]).await;

    let mut subscriber = subscribe(
        &proxy,
        SubscriptionRequest::new().with_shard("abc"),
    )
    .await;
    wait_for_upstream_subscription(&aggregator).await;

    let envelope = Envelope::log("app-1", "foo").with_tag("origin", "some-origin");
    let mut producer = TcpStream::connect(aggregator.ingress_addr()).await.unwrap();
    write_frame(&mut producer, &WireMessage::SendBatch(vec![envelope]))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut subscriber))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        WireMessage::Envelope(received) => {
            assert_eq!(
                received.tags["origin"],
                TagValue::Text("some-origin".into())
            );
            match &received.message {
                Message::Log(log) => assert_eq!(&log.payload[..], b"foo"),
                other => panic!("expected log, got {other:?}"),
            }
        }
        other => panic!("expected envelope, got {other:?}"),
    }

    proxy.stop().await;
    aggregator.stop().await;
}

#[tokio::test]
async fn test_producer_pool_round_trip_through_aggregator_and_proxy() {
    let aggregator = start_aggregator().await;
    let (proxy, _metrics) = start_proxy(vec![aggregator.egress_addr().to_string()]).await;

    let mut subscriber = subscribe(&proxy, SubscriptionRequest::new()).await;
    wait_for_upstream_subscription(&aggregator).await;

    // Producer side: local diode → transponder → client pool
    let connector = Connector::new(
        vec![Balancer::new(aggregator.ingress_addr().to_string())],
        None,
    );
    let pool = Arc::new(ClientPool::with_connector(
        connector,
        5,
        ConnConfig {
            retry_interval: Duration::from_millis(10),
            ..ConnConfig::default()
        },
        Arc::new(carrier_metrics::Counter::new()),
    ));
    for _ in 0..500 {
        if pool.live_count() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(pool.live_count() > 0, "producer pool never connected");

    let diode = Arc::new(carrier_diode::Diode::new(1_024));
    let transponder = Transponder::new(
        Arc::clone(&diode),
        pool,
        Tagger::from_identity("cf", "router", "0", "10.0.0.1"),
        TransponderConfig {
            batch_size: 100,
            flush_interval: Duration::from_millis(100),
        },
        Arc::new(carrier_metrics::Counter::new()),
    );
    let producer_cancel = CancellationToken::new();
    tokio::spawn(transponder.run(producer_cancel.clone()));

    diode.set(Envelope::log("app-1", "round-trip"));

    let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut subscriber))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match frame {
        WireMessage::Envelope(received) => {
            assert_eq!(received.source_id, "app-1");
            // Identity tags were decorated at the producer's egress
            assert_eq!(received.tags["deployment"], TagValue::Text("cf".into()));
            match &received.message {
                Message::Log(log) => assert_eq!(&log.payload[..], b"round-trip"),
                other => panic!("expected log, got {other:?}"),
            }
        }
        other => panic!("expected envelope, got {other:?}"),
    }

    producer_cancel.cancel();
    proxy.stop().await;
    aggregator.stop().await;
}

#[tokio::test]
async fn test_stop_drains_subscriber_and_rejects_further_queries() {
    let aggregator = start_aggregator().await;
    let (proxy, _metrics) = start_proxy(vec![aggregator.egress_addr().to_string()]).await;

    let mut subscriber = subscribe(&proxy, SubscriptionRequest::new()).await;
    wait_for_upstream_subscription(&aggregator).await;

    let mut producer = TcpStream::connect(aggregator.ingress_addr()).await.unwrap();
    write_frame(
        &mut producer,
        &WireMessage::SendBatch(vec![Envelope::log("app-1", "last-words")]),
    )
    .await
    .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut subscriber))
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, WireMessage::Envelope(_)));

    let egress_addr = proxy.egress_addr();
    proxy.stop().await;

    // Clean close after drain
    let frame = tokio::time::timeout(Duration::from_secs(5), read_frame(&mut subscriber))
        .await
        .unwrap()
        .unwrap();
    assert!(frame.is_none());

    // Further queries fail fast rather than hanging until a deadline
    let started = std::time::Instant::now();
    if let Ok(mut query) = TcpStream::connect(egress_addr).await {
        if write_frame(
            &mut query,
            &WireMessage::ContainerMetrics {
                source_id: "some-app".into(),
                deadline_ms: 5_000,
            },
        )
        .await
        .is_ok()
            && let Ok(Some(WireMessage::Error { code, .. })) = read_frame(&mut query).await
        {
            assert_eq!(code, ErrorCode::Unavailable);
        }
    }
    assert!(started.elapsed() < Duration::from_secs(5));

    aggregator.stop().await;
}

#[tokio::test]
async fn test_health_endpoint_tracks_subscription_gauge() {
    let aggregator = start_aggregator().await;
    let (proxy, _metrics) = start_proxy(vec![aggregator.egress_addr().to_string()]).await;
    let health_addr = proxy.health_addr().unwrap();

    let response = http_get(health_addr, "/health").await;
    assert!(response.contains("loggregator_reverseLogProxy_subscriptionCount 0"));

    let subscriber = subscribe(&proxy, SubscriptionRequest::new()).await;
    for _ in 0..500 {
        let response = http_get(health_addr, "/health").await;
        if response.contains("loggregator_reverseLogProxy_subscriptionCount 1") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let response = http_get(health_addr, "/health").await;
    assert!(
        response.contains("loggregator_reverseLogProxy_subscriptionCount 1"),
        "gauge never reached 1: {response}"
    );

    drop(subscriber);
    for _ in 0..500 {
        let response = http_get(health_addr, "/health").await;
        if response.contains("loggregator_reverseLogProxy_subscriptionCount 0") {
            proxy.stop().await;
            aggregator.stop().await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("gauge never returned to 0");
}
