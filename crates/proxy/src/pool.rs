//! Upstream connection pool
//!
//! One entry per aggregator address, created lazily on first use. An
//! entry owns that address's cancellation scope and its cached unary
//! query connection: queries are serialized over one long-lived
//! stream, dialed on first use and redialed only after a failure.
//!
//! Subscribe streams are server-push and exclusively owned by their
//! reader task, so each subscription opens its own; they hang off the
//! entry's scope, and `close` aborts everything opened through it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use carrier_egress::EgressError;
use carrier_protocol::{
    Envelope, ErrorCode, Stream, SubscriptionRequest, WireMessage, read_frame, write_frame,
};

struct ConnEntry {
    cancel: CancellationToken,
    /// Cached query stream; `None` until first use or after a failure
    query: tokio::sync::Mutex<Option<Stream>>,
}

/// Pool of per-address upstream entries
pub struct UpstreamPool {
    tls: Option<TlsConnector>,
    conns: Mutex<HashMap<String, Arc<ConnEntry>>>,
}

/// Handle to one upstream address
#[derive(Clone)]
pub struct UpstreamConn {
    addr: String,
    tls: Option<TlsConnector>,
    entry: Arc<ConnEntry>,
}

impl UpstreamPool {
    /// Create a pool; `tls` applies to every dial
    pub fn new(tls: Option<TlsConnector>) -> Self {
        Self {
            tls,
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// Handle for `addr`, created on first use
    pub fn conn(&self, addr: &str) -> UpstreamConn {
        let entry = Arc::clone(self.conns.lock().entry(addr.to_string()).or_insert_with(
            || {
                Arc::new(ConnEntry {
                    cancel: CancellationToken::new(),
                    query: tokio::sync::Mutex::new(None),
                })
            },
        ));
        UpstreamConn {
            addr: addr.to_string(),
            tls: self.tls.clone(),
            entry,
        }
    }

    /// Abort every stream to `addr` and drop its cached connection
    pub fn close(&self, addr: &str) {
        if let Some(entry) = self.conns.lock().remove(addr) {
            close_entry(addr, &entry);
        }
    }

    /// Abort every stream to every address
    pub fn close_all(&self) {
        for (addr, entry) in self.conns.lock().drain() {
            close_entry(&addr, &entry);
        }
    }
}

fn close_entry(addr: &str, entry: &ConnEntry) {
    debug!(addr = %addr, "closing upstream connection");
    entry.cancel.cancel();
    // Drop the cached query stream unless a query is mid-flight; an
    // in-flight query holds the stream outside the cache and checks
    // the scope before putting it back.
    if let Ok(mut cached) = entry.query.try_lock() {
        *cached = None;
    }
}

impl UpstreamConn {
    /// The upstream address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// This address's cancellation scope
    pub fn cancelled(&self) -> CancellationToken {
        self.entry.cancel.clone()
    }

    /// Open a dedicated subscribe stream
    pub async fn subscribe(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<Stream, EgressError> {
        let mut stream = self.dial().await?;
        write_frame(&mut stream, &WireMessage::Subscribe(request.clone())).await?;
        Ok(stream)
    }

    /// Unary container-metrics query over the cached stream
    ///
    /// The stream is taken out of the cache for the exchange and put
    /// back only on success, so a failed or abandoned query can never
    /// leave a half-used connection behind; the next call redials.
    pub async fn query(
        &self,
        source_id: &str,
        deadline: Duration,
    ) -> Result<Vec<Envelope>, EgressError> {
        let mut cached = self.entry.query.lock().await;

        if self.entry.cancel.is_cancelled() {
            *cached = None;
            return Err(EgressError::Unavailable(format!("{} closed", self.addr)));
        }

        let mut stream = match cached.take() {
            Some(stream) => stream,
            None => self.dial().await?,
        };

        let envelopes = exchange_query(&mut stream, source_id, deadline).await?;
        if !self.entry.cancel.is_cancelled() {
            *cached = Some(stream);
        }
        Ok(envelopes)
    }

    async fn dial(&self) -> Result<Stream, EgressError> {
        Stream::connect(&self.addr, self.tls.as_ref())
            .await
            .map_err(|e| EgressError::Unavailable(format!("{}: {e}", self.addr)))
    }
}

async fn exchange_query(
    stream: &mut Stream,
    source_id: &str,
    deadline: Duration,
) -> Result<Vec<Envelope>, EgressError> {
    write_frame(
        stream,
        &WireMessage::ContainerMetrics {
            source_id: source_id.to_string(),
            deadline_ms: deadline.as_millis() as u64,
        },
    )
    .await?;

    match read_frame(stream).await? {
        Some(WireMessage::ContainerMetricsReply(envelopes)) => Ok(envelopes),
        Some(WireMessage::Error { code, message }) => match code {
            ErrorCode::Unavailable => Err(EgressError::Unavailable(message)),
            _ => Err(EgressError::Unavailable(format!("{code:?}: {message}"))),
        },
        other => Err(EgressError::Unavailable(format!(
            "unexpected reply: {other:?}"
        ))),
    }
}

#[cfg(test)]
#[path = "pool_test.rs"]
mod tests;
