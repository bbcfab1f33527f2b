//! Egress server: subscribe streams and container-metric queries
//!
//! Accepts long-lived subscriber connections. The first frame selects
//! the surface:
//!
//! - `Subscribe` starts a server-push stream of `Envelope` (or
//!   `EnvelopeBatch`) frames matching the request
//! - `ContainerMetrics` is a unary query answered with one reply frame
//!
//! # Draining
//!
//! `stop()` flips the server into draining: new subscribes and queries
//! are rejected with `Unavailable`, the root scope is cancelled, and
//! every delivery task flushes the envelopes already sitting in its
//! subscription queue before closing. `stop()` returns once all
//! connection tasks finish or the drain deadline elapses.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use carrier_metrics::Counter;
use carrier_protocol::{FrameReader, Stream, WireMessage, read_frame, write_frame};

use crate::error::{EgressError, Result};
use crate::source::{EnvelopeSource, MetricQuerier, SubscriptionStream};

/// Default batch size for batched delivery
const DEFAULT_BATCH_SIZE: usize = 100;

/// Default flush interval for partial batches
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(50);

/// Egress server configuration
#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Bind address (e.g. "0.0.0.0:8082")
    pub address: String,

    /// Maximum envelopes per batched-delivery frame
    pub batch_size: usize,

    /// Flush interval for partial batches
    pub batch_interval: Duration,

    /// Query deadline applied when the caller does not supply one
    pub default_query_deadline: Duration,

    /// Bound on graceful stop
    pub drain_deadline: Duration,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:0".into(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            default_query_deadline: Duration::from_secs(5),
            drain_deadline: Duration::from_secs(10),
        }
    }
}

struct ServerState {
    config: EgressConfig,
    source: Arc<dyn EnvelopeSource>,
    querier: Arc<dyn MetricQuerier>,
    egress: Arc<Counter>,
    draining: AtomicBool,
    /// Cancels every subscription's delivery loop
    drain: CancellationToken,
    /// Stops the accept loop once the drain is over
    shutdown: CancellationToken,
    tracker: TaskTracker,
    tls: Option<TlsAcceptor>,
}

/// Egress server bound to its listener
pub struct EgressServer {
    state: Arc<ServerState>,
    listener: TcpListener,
    addr: SocketAddr,
}

/// Clonable handle used to drain and stop a running egress server
#[derive(Clone)]
pub struct EgressHandle {
    state: Arc<ServerState>,
}

impl EgressServer {
    /// Bind the listener
    ///
    /// Binding is eager so fatal bind errors surface before any task
    /// starts, and tests can bind port 0.
    pub async fn bind(
        config: EgressConfig,
        source: Arc<dyn EnvelopeSource>,
        querier: Arc<dyn MetricQuerier>,
        egress: Arc<Counter>,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let listener =
            TcpListener::bind(&config.address)
                .await
                .map_err(|e| EgressError::Bind {
                    address: config.address.clone(),
                    source: e,
                })?;
        let addr = listener.local_addr()?;

        Ok(Self {
            state: Arc::new(ServerState {
                config,
                source,
                querier,
                egress,
                draining: AtomicBool::new(false),
                drain: CancellationToken::new(),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                tls,
            }),
            listener,
            addr,
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// A handle for stopping the server
    pub fn handle(&self) -> EgressHandle {
        EgressHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Accept connections until stopped
    pub async fn run(self) {
        info!(addr = %self.addr, "egress server listening");

        loop {
            tokio::select! {
                _ = self.state.shutdown.cancelled() => break,
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let state = Arc::clone(&self.state);
                            self.state.tracker.spawn(async move {
                                if let Err(e) = handle_connection(state, stream).await {
                                    debug!(peer = %peer, error = %e, "egress connection ended");
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

        info!(addr = %self.addr, "egress server stopped");
    }
}

impl EgressHandle {
    /// Whether the server is draining
    pub fn is_draining(&self) -> bool {
        self.state.draining.load(Ordering::Relaxed)
    }

    /// Drain and stop
    ///
    /// Flips into draining (new subscribes and queries are rejected
    /// with `Unavailable` while existing deliveries flush), cancels
    /// every subscription's scope, waits for delivery tasks up to the
    /// drain deadline, then closes the listener.
    pub async fn stop(&self) {
        self.state.draining.store(true, Ordering::Relaxed);
        self.state.drain.cancel();
        self.state.tracker.close();

        if tokio::time::timeout(self.state.config.drain_deadline, self.state.tracker.wait())
            .await
            .is_err()
        {
            warn!("drain deadline elapsed with connections still open");
        }

        self.state.shutdown.cancel();
    }
}

async fn handle_connection(state: Arc<ServerState>, tcp: TcpStream) -> Result<()> {
    tcp.set_nodelay(true).ok();
    let stream = Stream::accept(tcp, state.tls.as_ref()).await?;
    let (mut reader, mut writer) = tokio::io::split(stream);

    let Some(first) = read_frame(&mut reader).await? else {
        return Ok(());
    };

    match first {
        WireMessage::Subscribe(request) => {
            if state.draining.load(Ordering::Relaxed) {
                return reject(&mut writer, EgressError::Draining).await;
            }
            if let Err(e) = request.validate() {
                return reject(&mut writer, e.into()).await;
            }

            let stream = match state.source.subscribe(&request) {
                Ok(stream) => stream,
                Err(e) => return reject(&mut writer, e).await,
            };

            debug!(shard = %request.shard_id, batched = request.batched, "subscriber connected");

            if request.batched {
                deliver_batched(&state, reader, writer, stream).await
            } else {
                deliver(&state, reader, writer, stream).await
            }
        }
        WireMessage::ContainerMetrics {
            source_id,
            deadline_ms,
        } => serve_queries(&state, reader, writer, source_id, deadline_ms).await,
        other => {
            debug!(message = ?other, "unexpected first frame");
            reject(
                &mut writer,
                EgressError::Protocol(carrier_protocol::ProtocolError::InvalidRequest(
                    "expected subscribe or query".into(),
                )),
            )
            .await
        }
    }
}

async fn reject<W>(writer: &mut W, error: EgressError) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = WireMessage::Error {
        code: error.code(),
        message: error.to_string(),
    };
    write_frame(writer, &frame).await?;
    Ok(())
}

/// Unary query loop
///
/// Answers the handshake query, then keeps the connection open and
/// answers further `ContainerMetrics` frames, so a client can hold one
/// long-lived query connection per server instead of dialing per call.
/// Draining closes the connection once the in-flight answer is out.
async fn serve_queries<R, W>(
    state: &ServerState,
    mut reader: R,
    mut writer: W,
    source_id: String,
    deadline_ms: u64,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    answer_query(state, &mut writer, &source_id, deadline_ms).await?;

    let mut frames = FrameReader::new();
    loop {
        let frame = tokio::select! {
            _ = state.drain.cancelled() => break,
            frame = frames.read(&mut reader) => frame,
        };

        match frame {
            Ok(Some(WireMessage::ContainerMetrics {
                source_id,
                deadline_ms,
            })) => {
                if state.draining.load(Ordering::Relaxed) {
                    reject(&mut writer, EgressError::Draining).await?;
                    break;
                }
                answer_query(state, &mut writer, &source_id, deadline_ms).await?;
            }
            Ok(Some(other)) => {
                debug!(message = ?other, "unexpected frame on query connection");
                break;
            }
            Ok(None) | Err(_) => break,
        }
    }

    Ok(())
}

async fn answer_query<W>(
    state: &ServerState,
    writer: &mut W,
    source_id: &str,
    deadline_ms: u64,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if state.draining.load(Ordering::Relaxed) {
        return reject(writer, EgressError::Draining).await;
    }

    let deadline = if deadline_ms == 0 {
        state.config.default_query_deadline
    } else {
        Duration::from_millis(deadline_ms)
    };

    let reply = match tokio::time::timeout(
        deadline,
        state.querier.container_metrics(source_id, deadline),
    )
    .await
    {
        Ok(Ok(envelopes)) => WireMessage::ContainerMetricsReply(envelopes),
        Ok(Err(e)) => WireMessage::Error {
            code: e.code(),
            message: e.to_string(),
        },
        Err(_) => {
            let e = EgressError::DeadlineExceeded;
            WireMessage::Error {
                code: e.code(),
                message: e.to_string(),
            }
        }
    };

    write_frame(writer, &reply).await?;
    Ok(())
}

/// Per-envelope delivery loop
async fn deliver<R, W>(
    state: &ServerState,
    mut reader: R,
    mut writer: W,
    mut stream: SubscriptionStream,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FrameReader::new();
    loop {
        tokio::select! {
            envelope = stream.next() => {
                let frame = WireMessage::Envelope((*envelope).clone());
                if write_frame(&mut writer, &frame).await.is_err() {
                    return Err(EgressError::UnexpectedEof);
                }
                state.egress.inc();
            }
            _ = state.drain.cancelled() => {
                // Server drain: detach from the supply first so the
                // queued tail is finite, then flush it.
                stream.close();
                flush_queued(state, &mut writer, &stream).await;
                let _ = writer.shutdown().await;
                return Ok(());
            }
            _ = frames.read(&mut reader) => {
                // The subscriber sends nothing after the handshake, so
                // any read completion means it went away. Drop the
                // queued tail without sending.
                debug!("subscriber disconnected");
                return Ok(());
            }
        }
    }
}

/// Batched delivery loop
async fn deliver_batched<R, W>(
    state: &ServerState,
    mut reader: R,
    mut writer: W,
    mut stream: SubscriptionStream,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer: Vec<carrier_protocol::Envelope> = Vec::with_capacity(state.config.batch_size);
    let mut frames = FrameReader::new();
    let mut flush_timer = tokio::time::interval(state.config.batch_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            envelope = stream.next() => {
                buffer.push((*envelope).clone());
                if buffer.len() >= state.config.batch_size
                    && !flush_batch(state, &mut writer, &mut buffer).await
                {
                    return Err(EgressError::UnexpectedEof);
                }
            }
            _ = flush_timer.tick() => {
                if !buffer.is_empty() && !flush_batch(state, &mut writer, &mut buffer).await {
                    return Err(EgressError::UnexpectedEof);
                }
            }
            _ = state.drain.cancelled() => {
                stream.close();
                while let Some(envelope) = stream.try_next() {
                    buffer.push((*envelope).clone());
                }
                if !buffer.is_empty() {
                    flush_batch(state, &mut writer, &mut buffer).await;
                }
                let _ = writer.shutdown().await;
                return Ok(());
            }
            _ = frames.read(&mut reader) => {
                debug!("subscriber disconnected");
                return Ok(());
            }
        }
    }
}

async fn flush_batch<W>(
    state: &ServerState,
    writer: &mut W,
    buffer: &mut Vec<carrier_protocol::Envelope>,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let batch = std::mem::take(buffer);
    let count = batch.len() as u64;
    let frame = WireMessage::EnvelopeBatch(batch);
    if write_frame(writer, &frame).await.is_err() {
        return false;
    }
    state.egress.add(count);
    true
}

async fn flush_queued<W>(state: &ServerState, writer: &mut W, stream: &SubscriptionStream)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = stream.try_next() {
        let frame = WireMessage::Envelope((*envelope).clone());
        if write_frame(writer, &frame).await.is_err() {
            return;
        }
        state.egress.inc();
    }
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
