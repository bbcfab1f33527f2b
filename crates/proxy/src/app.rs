//! Reverse log proxy wiring
//!
//! Assembles the proxy: static finder → fleet connector → local egress
//! server, plus the health endpoint. Stop cancels the root scope,
//! stops the finder so no new dials occur, closes every pooled
//! upstream connection, and gracefully stops the egress server under
//! its drain deadline.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::info;

use carrier_egress::{EgressConfig, EgressHandle, EgressServer};
use carrier_metrics::{HealthServer, MetricsRegistry};

use crate::connector::{ConnectorMetrics, FleetConnector};
use crate::error::Result;
use crate::finder::StaticFinder;
use crate::pool::UpstreamPool;

/// Proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upstream aggregator addresses
    pub ingress_addrs: Vec<String>,

    /// Local egress server configuration
    pub egress: EgressConfig,

    /// Health endpoint bind address, empty to disable
    pub health_addr: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            ingress_addrs: Vec::new(),
            egress: EgressConfig::default(),
            health_addr: String::new(),
        }
    }
}

/// A running reverse log proxy
pub struct Proxy {
    egress_addr: SocketAddr,
    egress_handle: EgressHandle,
    health: Option<HealthServer>,
    finder: Arc<StaticFinder>,
    pool: Arc<UpstreamPool>,
    connector: Arc<FleetConnector>,
    root: CancellationToken,
}

impl Proxy {
    /// Bind everything and start serving
    pub async fn start(
        config: ProxyConfig,
        metrics: Arc<MetricsRegistry>,
        server_tls: Option<TlsAcceptor>,
        client_tls: Option<TlsConnector>,
    ) -> Result<Self> {
        let root = CancellationToken::new();

        let finder = Arc::new(StaticFinder::new(config.ingress_addrs.clone()));
        let pool = Arc::new(UpstreamPool::new(client_tls));

        let connector = Arc::new(FleetConnector::new(
            Arc::clone(&pool),
            ConnectorMetrics {
                ingress: metrics.counter("ingress"),
                dropped: metrics.counter_with_tags("dropped", &[("direction", "egress")]),
                subscription_count: metrics.gauge("subscriptionCount"),
            },
            root.child_token(),
        ));

        // Watch the finder for address-set changes; the static variant
        // yields once and then pends until stop.
        {
            let finder = Arc::clone(&finder);
            let connector = Arc::clone(&connector);
            tokio::spawn(async move {
                while let Some(addrs) = finder.next().await {
                    connector.set_addrs(addrs);
                }
            });
        }
        // Seed synchronously so early subscribers see the fleet
        connector.set_addrs(config.ingress_addrs.clone());

        let egress_server = EgressServer::bind(
            config.egress,
            Arc::clone(&connector) as Arc<dyn carrier_egress::EnvelopeSource>,
            Arc::clone(&connector) as Arc<dyn carrier_egress::MetricQuerier>,
            metrics.counter("egress"),
            server_tls,
        )
        .await?;
        let egress_addr = egress_server.local_addr();
        let egress_handle = egress_server.handle();
        tokio::spawn(egress_server.run());

        let health = if config.health_addr.is_empty() {
            None
        } else {
            Some(HealthServer::start(&config.health_addr, Arc::clone(&metrics)).await?)
        };

        info!(
            egress = %egress_addr,
            upstreams = config.ingress_addrs.len(),
            "reverse log proxy started"
        );

        Ok(Self {
            egress_addr,
            egress_handle,
            health,
            finder,
            pool,
            connector,
            root,
        })
    }

    /// The bound egress address
    pub fn egress_addr(&self) -> SocketAddr {
        self.egress_addr
    }

    /// The bound health address, if enabled
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.health.as_ref().map(|h| h.addr())
    }

    /// The fleet connector (shared with the egress server)
    pub fn connector(&self) -> &Arc<FleetConnector> {
        &self.connector
    }

    /// Stop serving
    ///
    /// New subscribes are rejected immediately; existing subscribers
    /// receive what is already queued. Blocks until the graceful stop
    /// finishes or the drain deadline elapses.
    pub async fn stop(self) {
        self.root.cancel();
        self.finder.stop();
        self.pool.close_all();
        self.egress_handle.stop().await;
        if let Some(health) = self.health {
            health.stop().await;
        }
        info!("reverse log proxy stopped");
    }
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
