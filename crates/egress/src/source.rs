//! Seams between the egress server and its envelope supply
//!
//! The egress server is transport; where envelopes come from differs
//! by node. On an aggregator the source is the local subscription
//! registry fed by the ingress diode; on the reverse log proxy it is a
//! fleet connector that fans one stream per upstream into a merged
//! queue. Both hide behind these traits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use carrier_diode::Diode;
use carrier_protocol::{Envelope, SubscriptionRequest};

use crate::error::Result;

/// A live subscription's merged envelope queue
///
/// The queue is the single hand-off point between the supplying side
/// and the delivery loop. Closing detaches the supply (no new
/// envelopes are enqueued) while the already-queued tail stays
/// readable for drain flushing.
pub struct SubscriptionStream {
    queue: Arc<Diode<Arc<Envelope>>>,
    on_close: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl SubscriptionStream {
    /// Wrap a queue with a teardown hook
    pub fn new(
        queue: Arc<Diode<Arc<Envelope>>>,
        on_close: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            queue,
            on_close: Some(Box::new(on_close)),
        }
    }

    /// Wait for the next envelope
    pub async fn next(&self) -> Arc<Envelope> {
        self.queue.next().await
    }

    /// Take the next envelope if one is queued
    pub fn try_next(&self) -> Option<Arc<Envelope>> {
        self.queue.try_next()
    }

    /// Detach the supplying side, keeping the queued tail readable
    pub fn close(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Supplies envelope streams for accepted subscriptions
pub trait EnvelopeSource: Send + Sync {
    /// Register a subscription and return its queue
    ///
    /// The request has already passed validation.
    fn subscribe(&self, request: &SubscriptionRequest) -> Result<SubscriptionStream>;
}

/// Answers container-metric queries
#[async_trait]
pub trait MetricQuerier: Send + Sync {
    /// Retained container-metric envelopes for a source, within the
    /// caller's deadline
    async fn container_metrics(
        &self,
        source_id: &str,
        deadline: Duration,
    ) -> Result<Vec<Envelope>>;
}
