//! Tests for the ingress server

use super::*;
use std::time::Duration;

use tokio::net::TcpStream;

use carrier_protocol::{
    Envelope, LegacyEnvelope, LegacyEvent, LogType, Message, WireMessage, write_frame,
};

struct TestIngress {
    addr: SocketAddr,
    diode: Arc<Diode<Arc<Envelope>>>,
    metrics: IngressMetrics,
    cancel: CancellationToken,
}

async fn start_ingress(window: Duration) -> TestIngress {
    let diode = Arc::new(Diode::new(1_024));
    let metrics = IngressMetrics {
        ingress: Arc::new(Counter::new()),
        malformed: Arc::new(Counter::new()),
    };

    let server = IngressServer::bind(
        IngressConfig {
            address: "127.0.0.1:0".into(),
            aggregation_window: window,
        },
        Arc::clone(&diode),
        metrics.clone(),
        None,
    )
    .await
    .unwrap();

    let addr = server.local_addr();
    let cancel = CancellationToken::new();
    tokio::spawn(server.run(cancel.clone()));

    TestIngress {
        addr,
        diode,
        metrics,
        cancel,
    }
}

async fn next_envelope(diode: &Diode<Arc<Envelope>>) -> Arc<Envelope> {
    tokio::time::timeout(Duration::from_secs(5), diode.next())
        .await
        .expect("no envelope within five seconds")
}

#[tokio::test]
async fn test_batch_send_lands_in_diode_in_order() {
    let ingress = start_ingress(Duration::from_secs(1)).await;

    let mut producer = TcpStream::connect(ingress.addr).await.unwrap();
    let envelopes = vec![
        Envelope::log("app-1", "first"),
        Envelope::log("app-1", "second"),
    ];
    write_frame(&mut producer, &WireMessage::SendBatch(envelopes.clone()))
        .await
        .unwrap();

    assert_eq!(*next_envelope(&ingress.diode).await, envelopes[0]);
    assert_eq!(*next_envelope(&ingress.diode).await, envelopes[1]);
    assert_eq!(ingress.metrics.ingress.get(), 2);

    ingress.cancel.cancel();
}

#[tokio::test]
async fn test_legacy_send_is_converted_to_canonical_form() {
    let ingress = start_ingress(Duration::from_secs(1)).await;

    let mut producer = TcpStream::connect(ingress.addr).await.unwrap();
    let legacy = LegacyEnvelope {
        origin: "router".into(),
        deployment: "cf".into(),
        job: "router".into(),
        index: "0".into(),
        ip: "10.0.0.1".into(),
        timestamp: 5,
        event: LegacyEvent::LogMessage {
            app_id: "app-1".into(),
            message: "hello".into(),
            message_type: LogType::Out,
        },
    };
    write_frame(&mut producer, &WireMessage::Send(legacy))
        .await
        .unwrap();

    let envelope = next_envelope(&ingress.diode).await;
    assert_eq!(envelope.source_id, "app-1");
    assert!(envelope.tags.contains_key("origin"));
    match &envelope.message {
        Message::Log(log) => assert_eq!(&log.payload[..], b"hello"),
        other => panic!("expected log, got {other:?}"),
    }

    ingress.cancel.cancel();
}

#[tokio::test]
async fn test_malformed_envelope_is_counted_and_stream_continues() {
    let ingress = start_ingress(Duration::from_secs(1)).await;

    let mut producer = TcpStream::connect(ingress.addr).await.unwrap();
    write_frame(
        &mut producer,
        &WireMessage::SendBatch(vec![
            Envelope::counter("app", "", 1), // empty name fails validation
            Envelope::log("app", "still-delivered"),
        ]),
    )
    .await
    .unwrap();

    let envelope = next_envelope(&ingress.diode).await;
    match &envelope.message {
        Message::Log(log) => assert_eq!(&log.payload[..], b"still-delivered"),
        other => panic!("expected log, got {other:?}"),
    }
    assert_eq!(ingress.metrics.malformed.get(), 1);
    assert_eq!(ingress.metrics.ingress.get(), 1);

    ingress.cancel.cancel();
}

#[tokio::test]
async fn test_counters_aggregate_within_window() {
    let ingress = start_ingress(Duration::from_millis(100)).await;

    let mut producer = TcpStream::connect(ingress.addr).await.unwrap();
    let counters: Vec<Envelope> = (0..5)
        .map(|_| Envelope::counter("app", "requests", 3))
        .collect();
    write_frame(&mut producer, &WireMessage::SendBatch(counters))
        .await
        .unwrap();

    let envelope = next_envelope(&ingress.diode).await;
    match &envelope.message {
        Message::Counter(counter) => {
            assert_eq!(counter.name, "requests");
            assert_eq!(counter.delta, 15);
        }
        other => panic!("expected counter, got {other:?}"),
    }
    assert!(ingress.diode.try_next().is_none());

    ingress.cancel.cancel();
}

#[tokio::test]
async fn test_connection_close_flushes_pending_counters() {
    let ingress = start_ingress(Duration::from_secs(60)).await;

    let mut producer = TcpStream::connect(ingress.addr).await.unwrap();
    write_frame(
        &mut producer,
        &WireMessage::SendBatch(vec![Envelope::counter("app", "requests", 7)]),
    )
    .await
    .unwrap();
    drop(producer);

    let envelope = next_envelope(&ingress.diode).await;
    match &envelope.message {
        Message::Counter(counter) => assert_eq!(counter.delta, 7),
        other => panic!("expected counter, got {other:?}"),
    }

    ingress.cancel.cancel();
}
