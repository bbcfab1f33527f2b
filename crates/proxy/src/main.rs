//! Carrier reverse log proxy
//!
//! # Usage
//!
//! ```bash
//! carrier-proxy --ingress-addrs 10.0.0.1:8080,10.0.0.2:8080 \
//!     --egress-port 8082 --health-addr 127.0.0.1:33333 \
//!     --ca ca.pem --cert proxy.pem --key proxy.key \
//!     --metron-addr 127.0.0.1:3458 --job rlp --deployment cf --index 0
//! ```
//!
//! Exits 0 on clean shutdown; non-zero on bind or TLS load failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use carrier_egress::EgressConfig;
use carrier_metrics::{HealthServer, MetricsRegistry};
use carrier_protocol::TlsPaths;
use carrier_proxy::{MetricEmitter, Proxy, ProxyConfig};
use carrier_sender::{Balancer, ConnConfig, ConnManager, Connector, Tagger};

/// Reverse log proxy for the carrier pipeline
#[derive(Parser, Debug)]
#[command(name = "carrier-proxy")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Health endpoint bind address
    #[arg(long, default_value = "127.0.0.1:33333")]
    health_addr: String,

    /// Egress server port
    #[arg(long, default_value_t = 8082)]
    egress_port: u16,

    /// Comma-separated aggregator addresses to dial
    #[arg(long, value_delimiter = ',', required = true)]
    ingress_addrs: Vec<String>,

    /// CA certificate path (mutual TLS; requires --cert and --key)
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Certificate path
    #[arg(long)]
    cert: Option<PathBuf>,

    /// Private key path
    #[arg(long)]
    key: Option<PathBuf>,

    /// Local agent address for metric emission
    #[arg(long)]
    metron_addr: Option<String>,

    /// Job tag on emitted metrics
    #[arg(long, default_value = "")]
    job: String,

    /// Deployment tag on emitted metrics
    #[arg(long, default_value = "")]
    deployment: String,

    /// Index tag on emitted metrics
    #[arg(long, default_value = "")]
    index: String,

    /// Metric emission interval in milliseconds
    #[arg(long, default_value_t = 60_000)]
    metric_emitter_interval: u64,

    /// Debug endpoint port (0 = disabled)
    #[arg(long, default_value_t = 0)]
    pprof_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let tls_paths = match (&cli.ca, &cli.cert, &cli.key) {
        (Some(ca), Some(cert), Some(key)) => Some(TlsPaths {
            ca: ca.clone(),
            cert: cert.clone(),
            key: key.clone(),
        }),
        (None, None, None) => None,
        _ => bail!("--ca, --cert, and --key must be supplied together"),
    };

    let server_tls = tls_paths
        .as_ref()
        .map(carrier_protocol::server_tls)
        .transpose()
        .context("loading TLS server credentials")?;
    let client_tls = tls_paths
        .as_ref()
        .map(carrier_protocol::client_tls)
        .transpose()
        .context("loading TLS client credentials")?;

    let metrics = Arc::new(MetricsRegistry::new("loggregator", "reverseLogProxy"));

    let proxy = Proxy::start(
        ProxyConfig {
            ingress_addrs: cli.ingress_addrs.clone(),
            egress: EgressConfig {
                address: format!("0.0.0.0:{}", cli.egress_port),
                ..EgressConfig::default()
            },
            health_addr: cli.health_addr.clone(),
        },
        Arc::clone(&metrics),
        server_tls,
        client_tls.clone(),
    )
    .await
    .context("starting reverse log proxy")?;

    let debug_server = if cli.pprof_port > 0 {
        let addr = format!("127.0.0.1:{}", cli.pprof_port);
        Some(
            HealthServer::start(&addr, Arc::clone(&metrics))
                .await
                .context("starting debug endpoint")?,
        )
    } else {
        None
    };

    let emitter_cancel = CancellationToken::new();
    if let Some(metron_addr) = &cli.metron_addr {
        let connector = Connector::new(vec![Balancer::new(metron_addr.clone())], client_tls);
        let manager = ConnManager::new(connector, ConnConfig::default());
        let emitter = MetricEmitter::new(
            Arc::clone(&metrics),
            manager,
            Tagger::from_identity(&cli.deployment, &cli.job, &cli.index, ""),
            Duration::from_millis(cli.metric_emitter_interval.max(1)),
            "carrier-proxy",
        );
        tokio::spawn(emitter.run(emitter_cancel.clone()));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    emitter_cancel.cancel();
    proxy.stop().await;
    if let Some(debug_server) = debug_server {
        debug_server.stop().await;
    }

    Ok(())
}
