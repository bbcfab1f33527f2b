//! Tests for the client pool

use super::*;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use carrier_protocol::{Envelope, FrameReader};

use crate::balancer::Balancer;

async fn sink_server() -> (SocketAddr, mpsc::UnboundedReceiver<WireMessage>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut frames = FrameReader::new();
                while let Ok(Some(frame)) = frames.read(&mut stream).await {
                    if tx.send(frame).is_err() {
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}

fn quick_config() -> ConnConfig {
    ConnConfig {
        retry_interval: Duration::from_millis(10),
        ..ConnConfig::default()
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within five seconds");
}

#[tokio::test]
async fn test_pool_delivers_through_live_managers() {
    let (addr, mut rx) = sink_server().await;
    let connector = Connector::new(vec![Balancer::new(addr.to_string())], None);
    let dropped = Arc::new(Counter::new());
    let pool = ClientPool::with_connector(connector, 3, quick_config(), Arc::clone(&dropped));

    eventually(|| pool.live_count() == 3).await;

    let sent = 12;
    for i in 0..sent {
        pool.send(&WireMessage::SendBatch(vec![Envelope::log(
            "app",
            format!("{i}"),
        )]))
        .await
        .unwrap();
    }

    for _ in 0..sent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("frame not received")
            .unwrap();
    }
    assert_eq!(dropped.get(), 0);
}

#[tokio::test]
async fn test_pool_without_upstream_drops_and_counts() {
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = dead.local_addr().unwrap();
    drop(dead);

    let connector = Connector::new(vec![Balancer::new(addr.to_string())], None);
    let dropped = Arc::new(Counter::new());
    let pool = ClientPool::with_connector(connector, 2, quick_config(), Arc::clone(&dropped));

    let result = pool
        .send(&WireMessage::SendBatch(vec![Envelope::log("app", "x")]))
        .await;

    assert!(matches!(result, Err(SenderError::NoLiveStream)));
    assert_eq!(dropped.get(), 1);
}
