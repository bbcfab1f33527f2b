//! Aggregator wiring
//!
//! Assembles one aggregator node: ingress server → shared diode →
//! fan-out task → subscription registry → egress server, plus the
//! container-metric store fed from the fan-out path.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use carrier_diode::Diode;
use carrier_egress::{EgressConfig, EgressHandle, EgressServer};
use carrier_fanout::SubscriptionRegistry;
use carrier_metrics::MetricsRegistry;
use carrier_protocol::Envelope;

use crate::ingress::{IngressConfig, IngressMetrics, IngressServer};
use crate::source::{LocalQuerier, LocalSource};
use crate::store::ContainerMetricStore;
use crate::error::Result;

/// Default shared diode capacity
pub const DEFAULT_DIODE_CAPACITY: usize = carrier_diode::DEFAULT_CAPACITY;

/// Aggregator configuration
#[derive(Debug, Clone, Default)]
pub struct AggregatorConfig {
    pub ingress: IngressConfig,
    pub egress: EgressConfig,
    /// Shared diode capacity (0 = default)
    pub diode_capacity: usize,
}

/// A running aggregator node
pub struct Aggregator {
    ingress_addr: SocketAddr,
    egress_addr: SocketAddr,
    egress_handle: EgressHandle,
    registry: Arc<SubscriptionRegistry>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Aggregator {
    /// Bind both servers and start every task
    pub async fn start(
        config: AggregatorConfig,
        metrics: Arc<MetricsRegistry>,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();

        let capacity = if config.diode_capacity == 0 {
            DEFAULT_DIODE_CAPACITY
        } else {
            config.diode_capacity
        };

        let ingress_dropped = metrics.counter_with_tags("dropped", &[("direction", "ingress")]);
        let diode: Arc<Diode<Arc<Envelope>>> = Arc::new(Diode::with_alert(capacity, {
            let ingress_dropped = Arc::clone(&ingress_dropped);
            move |missed| {
                ingress_dropped.add(missed);
                warn!(missed, "dropped envelopes from ingress buffer");
            }
        }));

        let registry = Arc::new(SubscriptionRegistry::new(
            metrics.gauge("subscriptionCount"),
            metrics.counter_with_tags("dropped", &[("direction", "egress")]),
        ));
        let store = Arc::new(ContainerMetricStore::new());

        let ingress_server = IngressServer::bind(
            config.ingress,
            Arc::clone(&diode),
            IngressMetrics {
                ingress: metrics.counter("ingress"),
                malformed: metrics.counter("malformed"),
            },
            tls.clone(),
        )
        .await?;
        let ingress_addr = ingress_server.local_addr();

        let egress_server = EgressServer::bind(
            config.egress,
            Arc::new(LocalSource::new(Arc::clone(&registry))),
            Arc::new(LocalQuerier::new(Arc::clone(&store))),
            metrics.counter("egress"),
            tls,
        )
        .await?;
        let egress_addr = egress_server.local_addr();
        let egress_handle = egress_server.handle();

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(ingress_server.run(cancel.child_token())));
        tasks.push(tokio::spawn(egress_server.run()));
        tasks.push(tokio::spawn(fanout_loop(
            Arc::clone(&diode),
            Arc::clone(&registry),
            store,
            cancel.child_token(),
        )));

        info!(
            ingress = %ingress_addr,
            egress = %egress_addr,
            "aggregator started"
        );

        Ok(Self {
            ingress_addr,
            egress_addr,
            egress_handle,
            registry,
            cancel,
            tasks,
        })
    }

    /// The bound ingress address
    pub fn ingress_addr(&self) -> SocketAddr {
        self.ingress_addr
    }

    /// The bound egress address
    pub fn egress_addr(&self) -> SocketAddr {
        self.egress_addr
    }

    /// The subscription registry (shared with the egress server)
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Drain subscribers and stop
    ///
    /// Existing subscribers receive what is already queued; new work
    /// is rejected immediately. Returns once the drain completes or
    /// its deadline elapses.
    pub async fn stop(self) {
        self.egress_handle.stop().await;
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("aggregator stopped");
    }
}

/// Single reader of the shared diode
///
/// Feeds the container-metric store and fans out to subscriptions.
/// This is the only task allowed to poll the diode.
async fn fanout_loop(
    diode: Arc<Diode<Arc<Envelope>>>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<ContainerMetricStore>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            _ = cancel.cancelled() => break,
            envelope = diode.next() => envelope,
        };

        store.update(&envelope);
        registry.fanout(envelope);
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
