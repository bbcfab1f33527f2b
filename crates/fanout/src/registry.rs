//! Subscription registry and fan-out

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use carrier_diode::Diode;
use carrier_metrics::{Counter, Gauge};
use carrier_protocol::{Envelope, Filter, ProtocolError, Result, SubscriptionRequest};

use crate::DEFAULT_QUEUE_CAPACITY;
use crate::subscription::Subscription;

/// Shard table key
///
/// Named shards group competing consumers; an empty shard id makes the
/// subscription its own singleton group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ShardKey {
    Named(String),
    Solo(u64),
}

struct Member {
    id: u64,
    queue: Arc<Diode<Arc<Envelope>>>,
}

struct ShardGroup {
    filter: Filter,
    next: usize,
    members: Vec<Member>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    shards: HashMap<ShardKey, ShardGroup>,
    member_index: HashMap<u64, ShardKey>,
}

/// Maintains the set of active subscriptions and delivers envelopes
///
/// A single lock guards register, unregister, and the per-envelope
/// lookup, so the `subscriptionCount` gauge is always consistent with
/// the visible set.
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
    subscription_count: Arc<Gauge>,
    egress_dropped: Arc<Counter>,
    queue_capacity: usize,
}

impl SubscriptionRegistry {
    /// Create a registry reporting into the given gauge and drop counter
    pub fn new(subscription_count: Arc<Gauge>, egress_dropped: Arc<Counter>) -> Self {
        Self::with_queue_capacity(subscription_count, egress_dropped, DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a registry with a custom per-subscription queue capacity
    pub fn with_queue_capacity(
        subscription_count: Arc<Gauge>,
        egress_dropped: Arc<Counter>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            subscription_count,
            egress_dropped,
            queue_capacity,
        }
    }

    /// Register a subscription
    ///
    /// Rejects invalid filters and shard joins whose filter differs
    /// from the shard's existing members. Both are permanent errors.
    pub fn register(self: &Arc<Self>, request: &SubscriptionRequest) -> Result<Subscription> {
        request.validate()?;

        let mut inner = self.inner.lock();

        let id = inner.next_id;
        inner.next_id += 1;

        let key = if request.shard_id.is_empty() {
            ShardKey::Solo(id)
        } else {
            ShardKey::Named(request.shard_id.clone())
        };

        if let Some(group) = inner.shards.get(&key)
            && group.filter != request.filter
        {
            return Err(ProtocolError::InvalidRequest(
                "shard members must use identical filters".into(),
            ));
        }

        let dropped = Arc::new(Counter::new());
        let queue = {
            let dropped = Arc::clone(&dropped);
            let egress_dropped = Arc::clone(&self.egress_dropped);
            Arc::new(Diode::with_alert(self.queue_capacity, move |missed| {
                dropped.add(missed);
                egress_dropped.add(missed);
            }))
        };

        let group = inner.shards.entry(key.clone()).or_insert_with(|| ShardGroup {
            filter: request.filter.clone(),
            next: 0,
            members: Vec::new(),
        });
        group.members.push(Member {
            id,
            queue: Arc::clone(&queue),
        });
        inner.member_index.insert(id, key);

        self.subscription_count.inc();

        debug!(
            id,
            shard = %request.shard_id,
            filter = ?request.filter,
            "subscription registered"
        );

        Ok(Subscription::new(id, queue, dropped, Arc::clone(self)))
    }

    /// Remove a subscription by id
    ///
    /// Called from `Subscription::drop`; callers never need to invoke
    /// it directly.
    pub(crate) fn unregister(&self, id: u64) {
        let mut inner = self.inner.lock();

        let Some(key) = inner.member_index.remove(&id) else {
            return;
        };
        let group_empty = match inner.shards.get_mut(&key) {
            Some(group) => {
                group.members.retain(|m| m.id != id);
                group.members.is_empty()
            }
            None => false,
        };
        if group_empty {
            inner.shards.remove(&key);
        }

        self.subscription_count.dec();
        debug!(id, "subscription unregistered");
    }

    /// Deliver an envelope to every matching shard group
    ///
    /// Within each group exactly one member receives the envelope,
    /// selected round-robin. Returns the number of queues written.
    pub fn fanout(&self, envelope: Arc<Envelope>) -> usize {
        let mut inner = self.inner.lock();
        let mut delivered = 0;

        for group in inner.shards.values_mut() {
            if group.members.is_empty() || !group.filter.matches(&envelope) {
                continue;
            }
            let pick = group.next % group.members.len();
            group.next = group.next.wrapping_add(1);
            group.members[pick].queue.set(Arc::clone(&envelope));
            delivered += 1;
        }

        delivered
    }

    /// Number of live subscriptions
    pub fn count(&self) -> usize {
        self.inner.lock().member_index.len()
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.count())
            .finish()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
