//! Carrier - Metrics
//!
//! Internal metrics collection and the health endpoint.
//!
//! # Overview
//!
//! This crate provides:
//! - Atomic `Counter` and `Gauge` primitives
//! - A named registry with static tag sets and stable metric names
//! - Text exposition and an HTTP health endpoint (axum)
//!
//! # Design
//!
//! Components obtain `Arc<Counter>` / `Arc<Gauge>` handles from the
//! registry once at wiring time and update them with plain relaxed
//! atomics afterwards; only the registry table itself takes a lock,
//! and only on handle creation and render.
//!
//! The names `ingress`, `egress`, `dropped` (tagged by `direction`),
//! and `subscriptionCount` are part of the operational contract and
//! must not change.

mod health;
mod registry;

pub use health::HealthServer;
pub use registry::MetricsRegistry;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// One monotone metric series
///
/// Counts events that only ever accumulate (envelopes accepted,
/// envelopes dropped). Handles are shared through the registry as
/// `Arc<Counter>`; every update is a single relaxed fetch-add, so the
/// pipeline hot paths record without coordinating.
#[derive(Debug, Default)]
pub struct Counter {
    total: AtomicU64,
}

impl Counter {
    /// A fresh series at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event
    #[inline]
    pub fn inc(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` events at once (batch flushes, drop bursts)
    #[inline]
    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::Relaxed);
    }

    /// Events recorded so far
    #[inline]
    pub fn get(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// One level-style metric series
///
/// Tracks a value that moves both ways (open subscriptions). The same
/// sharing rules as `Counter` apply.
#[derive(Debug, Default)]
pub struct Gauge {
    level: AtomicI64,
}

impl Gauge {
    /// A fresh series at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the level by one
    #[inline]
    pub fn inc(&self) {
        self.level.fetch_add(1, Ordering::Relaxed);
    }

    /// Lower the level by one
    #[inline]
    pub fn dec(&self) {
        self.level.fetch_sub(1, Ordering::Relaxed);
    }

    /// Overwrite the level
    #[inline]
    pub fn set(&self, level: i64) {
        self.level.store(level, Ordering::Relaxed);
    }

    /// The current level
    #[inline]
    pub fn get(&self) -> i64 {
        self.level.load(Ordering::Relaxed)
    }

    /// The current level as the exposition format reports it
    #[inline]
    pub fn value(&self) -> f64 {
        self.get() as f64
    }
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
