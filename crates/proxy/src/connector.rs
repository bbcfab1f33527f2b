//! Fleet connector
//!
//! Presents the union of envelopes from many aggregators as a single
//! source. Every local subscription opens one subscribe stream per
//! upstream address with the same request; the shard contract
//! guarantees the aggregator tier round-robins within each shard, so
//! the merge adds no duplication as long as each producer feeds one
//! aggregator. All upstream streams of a subscription feed that
//! subscription's own lossy queue.
//!
//! A dead upstream stream reconnects with a fixed backoff until the
//! subscription or the address scope is cancelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use carrier_diode::Diode;
use carrier_egress::{EgressError, EnvelopeSource, MetricQuerier, SubscriptionStream};
use carrier_metrics::{Counter, Gauge};
use carrier_protocol::{Envelope, FrameReader, SubscriptionRequest, WireMessage};

use crate::pool::{UpstreamConn, UpstreamPool};

/// Default per-subscription merge queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Default reconnect backoff for dead upstream streams
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Metrics the connector reports into
#[derive(Clone)]
pub struct ConnectorMetrics {
    /// Envelopes received from upstream aggregators
    pub ingress: Arc<Counter>,
    /// Envelopes lost to full subscription queues
    pub dropped: Arc<Counter>,
    /// Open local subscriptions
    pub subscription_count: Arc<Gauge>,
}

/// Merges subscribe streams from the aggregator fleet
pub struct FleetConnector {
    pool: Arc<UpstreamPool>,
    addrs: RwLock<Vec<String>>,
    metrics: ConnectorMetrics,
    queue_capacity: usize,
    reconnect_backoff: Duration,
    root: CancellationToken,
}

impl FleetConnector {
    /// Create a connector; `root` bounds every upstream task
    pub fn new(
        pool: Arc<UpstreamPool>,
        metrics: ConnectorMetrics,
        root: CancellationToken,
    ) -> Self {
        Self {
            pool,
            addrs: RwLock::new(Vec::new()),
            metrics,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            reconnect_backoff: DEFAULT_RECONNECT_BACKOFF,
            root,
        }
    }

    /// Replace the upstream address set
    ///
    /// Existing subscriptions keep their streams; new subscriptions
    /// fan out to the new set.
    pub fn set_addrs(&self, addrs: Vec<String>) {
        info!(count = addrs.len(), "upstream address set updated");
        *self.addrs.write() = addrs;
    }

    /// Current upstream address set
    pub fn addrs(&self) -> Vec<String> {
        self.addrs.read().clone()
    }
}

impl EnvelopeSource for FleetConnector {
    fn subscribe(&self, request: &SubscriptionRequest) -> carrier_egress::Result<SubscriptionStream> {
        let addrs = self.addrs();
        let cancel = self.root.child_token();

        let queue = {
            let dropped = Arc::clone(&self.metrics.dropped);
            Arc::new(Diode::with_alert(self.queue_capacity, move |missed| {
                dropped.add(missed);
            }))
        };

        for addr in addrs {
            let conn = self.pool.conn(&addr);
            tokio::spawn(upstream_reader(
                conn,
                request.clone(),
                Arc::clone(&queue),
                Arc::clone(&self.metrics.ingress),
                cancel.clone(),
                self.reconnect_backoff,
            ));
        }

        self.metrics.subscription_count.inc();
        debug!(shard = %request.shard_id, "proxy subscription opened");

        let gauge = Arc::clone(&self.metrics.subscription_count);
        Ok(SubscriptionStream::new(queue, move || {
            cancel.cancel();
            gauge.dec();
        }))
    }
}

#[async_trait]
impl MetricQuerier for FleetConnector {
    /// Fan the query to every upstream concurrently
    ///
    /// Partial failures are tolerated; only when every upstream errors
    /// does the first error surface.
    async fn container_metrics(
        &self,
        source_id: &str,
        deadline: Duration,
    ) -> carrier_egress::Result<Vec<Envelope>> {
        let addrs = self.addrs();
        if addrs.is_empty() {
            return Err(EgressError::Unavailable("no upstream addresses".into()));
        }

        let mut queries = JoinSet::new();
        for addr in addrs {
            let conn = self.pool.conn(&addr);
            let source_id = source_id.to_string();
            queries.spawn(async move {
                tokio::time::timeout(deadline, conn.query(&source_id, deadline))
                    .await
                    .unwrap_or(Err(EgressError::DeadlineExceeded))
            });
        }

        let mut envelopes = Vec::new();
        let mut first_error = None;
        let mut succeeded = false;

        while let Some(result) = queries.join_next().await {
            match result {
                Ok(Ok(mut batch)) => {
                    succeeded = true;
                    envelopes.append(&mut batch);
                }
                Ok(Err(e)) => {
                    debug!(error = %e, "upstream query failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    debug!(error = %e, "upstream query task failed");
                    first_error.get_or_insert(EgressError::Unavailable(e.to_string()));
                }
            }
        }

        match (succeeded, first_error) {
            (false, Some(error)) => Err(error),
            _ => Ok(envelopes),
        }
    }
}

/// One upstream stream of one subscription
///
/// Reconnects until the subscription or the address scope ends.
async fn upstream_reader(
    conn: UpstreamConn,
    request: SubscriptionRequest,
    queue: Arc<Diode<Arc<Envelope>>>,
    ingress: Arc<Counter>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    let addr_scope = conn.cancelled();

    loop {
        if cancel.is_cancelled() || addr_scope.is_cancelled() {
            break;
        }

        match conn.subscribe(&request).await {
            Ok(mut stream) => {
                let mut frames = FrameReader::new();
                loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = addr_scope.cancelled() => return,
                        frame = frames.read(&mut stream) => frame,
                    };

                    match frame {
                        Ok(Some(WireMessage::Envelope(envelope))) => {
                            ingress.inc();
                            queue.set(Arc::new(envelope));
                        }
                        Ok(Some(WireMessage::EnvelopeBatch(envelopes))) => {
                            for envelope in envelopes {
                                ingress.inc();
                                queue.set(Arc::new(envelope));
                            }
                        }
                        Ok(Some(WireMessage::Error { code, message })) => {
                            debug!(addr = %conn.addr(), ?code, message, "upstream closed stream");
                            break;
                        }
                        Ok(Some(_)) => {}
                        Ok(None) | Err(_) => break,
                    }
                }
            }
            Err(e) => {
                debug!(addr = %conn.addr(), error = %e, "upstream subscribe failed");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = addr_scope.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}

#[cfg(test)]
#[path = "connector_test.rs"]
mod tests;
