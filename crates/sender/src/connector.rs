//! Upstream dialing
//!
//! Consults balancers in preference order and dials the first one that
//! resolves to at least one address. Dial failures are not retried
//! here; the conn manager owns retry cadence.

use std::sync::Arc;

use tokio_rustls::TlsConnector;
use tracing::debug;

use carrier_protocol::Stream;

use crate::balancer::Balancer;
use crate::error::{Result, SenderError};

/// Dials upstream aggregators via a balancer preference list
pub struct Connector {
    balancers: Vec<Balancer>,
    tls: Option<TlsConnector>,
}

impl Connector {
    /// Create a connector over the given preference order
    pub fn new(balancers: Vec<Balancer>, tls: Option<TlsConnector>) -> Arc<Self> {
        Arc::new(Self { balancers, tls })
    }

    /// Dial one upstream
    pub async fn connect(&self) -> Result<Stream> {
        for balancer in &self.balancers {
            let addr = match balancer.pick().await {
                Ok(addr) => addr,
                Err(e) => {
                    debug!(name = %balancer.name(), error = %e, "balancer yielded no address");
                    continue;
                }
            };

            let stream = Stream::connect(&addr.to_string(), self.tls.as_ref()).await?;
            debug!(name = %balancer.name(), addr = %addr, "connected upstream");
            return Ok(stream);
        }

        Err(SenderError::NoAddresses)
    }
}
