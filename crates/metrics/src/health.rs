//! HTTP health endpoint
//!
//! Serves `GET /health` with the text exposition of a metrics
//! registry. The same handler backs the optional debug listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, extract::State, routing::get};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::MetricsRegistry;

/// Health endpoint server
///
/// Binds eagerly so callers learn the effective address (tests bind
/// port 0) and bind failures surface before the server task starts.
pub struct HealthServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthServer {
    /// Bind `addr` and start serving `/health`
    pub async fn start(addr: &str, registry: Arc<MetricsRegistry>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let cancel = CancellationToken::new();

        let app = Router::new()
            .route("/health", get(render_health))
            .with_state(registry);

        let shutdown = cancel.clone();
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "health server error");
            }
        });

        info!(addr = %addr, "health endpoint listening");

        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    /// The bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop serving and wait for the listener task to finish
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn render_health(State(registry): State<Arc<MetricsRegistry>>) -> String {
    registry.render()
}

#[cfg(test)]
#[path = "health_test.rs"]
mod tests;
