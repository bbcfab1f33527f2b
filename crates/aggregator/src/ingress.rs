//! Ingress server
//!
//! Accepts producer connections carrying `Send` (legacy v1) and
//! `SendBatch` (v2) frames. Every accepted envelope lands in the
//! shared diode; there is no back-pressure at this layer because the
//! diode is lossy by design.
//!
//! Counter envelopes are aggregated per connection: deltas for the
//! same `(name, tags)` key within the batching window are summed and
//! flushed as one envelope. The window is also flushed when the
//! connection ends, so short-lived producers never strand deltas.
//!
//! A malformed envelope is counted and skipped; the stream continues
//! and the producer is never told. Frame-level corruption does tear
//! the connection down since framing can no longer be trusted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use carrier_diode::Diode;
use carrier_metrics::Counter;
use carrier_protocol::{CounterAggregator, Envelope, FrameReader, Stream, WireMessage};

use crate::error::{AggregatorError, Result};

/// Default counter batching window
const DEFAULT_AGGREGATION_WINDOW: Duration = Duration::from_secs(1);

/// Ingress server configuration
#[derive(Debug, Clone)]
pub struct IngressConfig {
    /// Bind address (e.g. "0.0.0.0:8080")
    pub address: String,

    /// Counter aggregation window per connection
    pub aggregation_window: Duration,
}

impl Default for IngressConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:0".into(),
            aggregation_window: DEFAULT_AGGREGATION_WINDOW,
        }
    }
}

/// Ingress metrics handles
#[derive(Clone)]
pub struct IngressMetrics {
    /// Envelopes accepted into the diode
    pub ingress: Arc<Counter>,
    /// Envelopes that failed schema validation
    pub malformed: Arc<Counter>,
}

/// Ingress server feeding the shared diode
pub struct IngressServer {
    config: IngressConfig,
    diode: Arc<Diode<Arc<Envelope>>>,
    metrics: IngressMetrics,
    tls: Option<TlsAcceptor>,
    listener: TcpListener,
    addr: SocketAddr,
}

impl IngressServer {
    /// Bind the listener
    pub async fn bind(
        config: IngressConfig,
        diode: Arc<Diode<Arc<Envelope>>>,
        metrics: IngressMetrics,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind(&config.address)
                .await
                .map_err(|e| AggregatorError::Bind {
                    address: config.address.clone(),
                    source: e,
                })?;
        let addr = listener.local_addr()?;

        Ok(Self {
            config,
            diode,
            metrics,
            tls,
            listener,
            addr,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Accept producer connections until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        info!(addr = %self.addr, "ingress server listening");

        let server = Arc::new(self);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = server.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let server = Arc::clone(&server);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream, cancel).await {
                                    debug!(peer = %peer, error = %e, "ingress connection ended");
                                }
                            });
                        }
                        Err(e) => {
                            warn!(error = %e, "accept error");
                        }
                    }
                }
            }
        }

        info!(addr = %server.addr, "ingress server stopped");
    }

    /// Handle a single producer connection
    async fn handle_connection(&self, tcp: TcpStream, cancel: CancellationToken) -> Result<()> {
        tcp.set_nodelay(true).ok();
        let mut stream = Stream::accept(tcp, self.tls.as_ref()).await?;

        let mut aggregator = CounterAggregator::new();
        let mut frames = FrameReader::new();
        let mut flush_timer = tokio::time::interval(self.config.aggregation_window);
        flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = flush_timer.tick() => {
                    self.flush_counters(&mut aggregator);
                    continue;
                }
                frame = frames.read(&mut stream) => frame,
            };

            match frame {
                Ok(Some(WireMessage::Send(legacy))) => {
                    self.accept_envelope(legacy.into_envelope(), &mut aggregator);
                }
                Ok(Some(WireMessage::SendBatch(envelopes))) => {
                    for envelope in envelopes {
                        self.accept_envelope(envelope, &mut aggregator);
                    }
                }
                Ok(Some(other)) => {
                    debug!(message = ?other, "unexpected frame on ingress");
                    self.metrics.malformed.inc();
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "framing error, closing connection");
                    break;
                }
            }
        }

        self.flush_counters(&mut aggregator);
        Ok(())
    }

    fn accept_envelope(&self, envelope: Envelope, aggregator: &mut CounterAggregator) {
        if let Err(e) = envelope.validate() {
            debug!(error = %e, "dropping malformed envelope");
            self.metrics.malformed.inc();
            return;
        }

        self.metrics.ingress.inc();

        // Counters are coalesced within the window; everything else
        // goes straight to the diode.
        if let Some(envelope) = aggregator.add(envelope) {
            self.diode.set(Arc::new(envelope));
        }
    }

    fn flush_counters(&self, aggregator: &mut CounterAggregator) {
        for envelope in aggregator.flush() {
            self.diode.set(Arc::new(envelope));
        }
    }
}

#[cfg(test)]
#[path = "ingress_test.rs"]
mod tests;
