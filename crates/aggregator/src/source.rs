//! Registry-backed egress supply
//!
//! Implements the egress seams over the local subscription registry
//! and the local container-metric store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use carrier_egress::{EnvelopeSource, MetricQuerier, SubscriptionStream};
use carrier_fanout::SubscriptionRegistry;
use carrier_protocol::{Envelope, SubscriptionRequest};

use crate::store::ContainerMetricStore;

/// Envelope supply backed by the local registry
pub struct LocalSource {
    registry: Arc<SubscriptionRegistry>,
}

impl LocalSource {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }
}

impl EnvelopeSource for LocalSource {
    fn subscribe(&self, request: &SubscriptionRequest) -> carrier_egress::Result<SubscriptionStream> {
        let subscription = self.registry.register(request)?;
        let queue = Arc::clone(subscription.queue());
        // Dropping the registration is the teardown; the queued tail
        // stays readable for drain flushing.
        Ok(SubscriptionStream::new(queue, move || drop(subscription)))
    }
}

/// Query answers backed by the local store
pub struct LocalQuerier {
    store: Arc<ContainerMetricStore>,
}

impl LocalQuerier {
    pub fn new(store: Arc<ContainerMetricStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetricQuerier for LocalQuerier {
    async fn container_metrics(
        &self,
        source_id: &str,
        _deadline: Duration,
    ) -> carrier_egress::Result<Vec<Envelope>> {
        Ok(self.store.get(source_id))
    }
}
