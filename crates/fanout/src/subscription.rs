//! A single registered subscription

use std::sync::Arc;

use carrier_diode::Diode;
use carrier_metrics::Counter;
use carrier_protocol::Envelope;

use crate::registry::SubscriptionRegistry;

/// Handle to a registered subscription
///
/// Owns the per-subscription queue; dropping the handle unregisters
/// the subscription, so teardown is tied to the egress task's
/// lifetime no matter how it exits.
pub struct Subscription {
    id: u64,
    queue: Arc<Diode<Arc<Envelope>>>,
    dropped: Arc<Counter>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        id: u64,
        queue: Arc<Diode<Arc<Envelope>>>,
        dropped: Arc<Counter>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            id,
            queue,
            dropped,
            registry,
        }
    }

    /// The registry-assigned subscription id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The per-subscription queue
    pub fn queue(&self) -> &Arc<Diode<Arc<Envelope>>> {
        &self.queue
    }

    /// Envelopes dropped from this subscription's queue
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    /// Wait for the next envelope
    pub async fn next(&self) -> Arc<Envelope> {
        self.queue.next().await
    }

    /// Take the next envelope if one is queued
    pub fn try_next(&self) -> Option<Arc<Envelope>> {
        self.queue.try_next()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped.get())
            .finish()
    }
}
