//! Carrier - Diode
//!
//! A diode is a fixed-capacity ring buffer that lets any number of
//! producers hand values to a single consumer without ever blocking or
//! failing: a write into a full ring overwrites the oldest unread
//! slot. Loss under sustained overload is acceptable here and must be
//! observable, so every overwritten slot is counted and reported
//! through an alert hook.
//!
//! # Design
//!
//! - Each slot is an `ArcSwapOption` holding a sequence-stamped node,
//!   so writers replace and readers consume slots with single atomic
//!   swaps and no lock.
//! - The write cursor is an `AtomicU64` advanced by fetch-and-add,
//!   which serializes concurrent `set` calls.
//! - The reader compares slot sequence numbers against its own cursor
//!   to skip gaps left by overwrites, preserving write order modulo
//!   drops. Exactly one task may poll.
//! - `next().await` parks on a `tokio::sync::Notify`; `set` stores a
//!   wakeup permit, so the reader never misses a value.
//!
//! # Drop accounting
//!
//! Overwriting an unread slot increments the miss counter and fires
//! the alert hook with the count accumulated since the previous alert.
//! With capacity C and N > C unread writes, the alert calls sum to
//! exactly N − C. The hook runs on the writing task and must be
//! non-blocking.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwapOption;
use tokio::sync::Notify;

/// Default ring capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Alert hook invoked with the number of values missed since the last
/// alert. Must not block.
pub type AlertFn = Box<dyn Fn(u64) + Send + Sync>;

struct Node<T> {
    seq: u64,
    value: T,
}

/// Lossy many-producer, single-consumer ring buffer
pub struct Diode<T> {
    slots: Box<[ArcSwapOption<Node<T>>]>,
    write_seq: AtomicU64,
    read_seq: AtomicU64,
    pending_missed: AtomicU64,
    missed_total: AtomicU64,
    alert: Option<AlertFn>,
    notify: Notify,
}

impl<T: Clone> Diode<T> {
    /// Create a diode with the given capacity and no alert hook
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Create a diode that reports missed values through `alert`
    pub fn with_alert(capacity: usize, alert: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self::build(capacity, Some(Box::new(alert) as AlertFn))
    }

    fn build(capacity: usize, alert: Option<AlertFn>) -> Self {
        assert!(capacity > 0, "capacity must be > 0");

        let slots = (0..capacity)
            .map(|_| ArcSwapOption::empty())
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            write_seq: AtomicU64::new(0),
            read_seq: AtomicU64::new(0),
            pending_missed: AtomicU64::new(0),
            missed_total: AtomicU64::new(0),
            alert,
            notify: Notify::new(),
        }
    }

    /// Ring capacity
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Total values overwritten before being read
    pub fn missed(&self) -> u64 {
        self.missed_total.load(Ordering::Relaxed)
    }

    /// Write a value
    ///
    /// Never blocks and never fails. If the claimed slot still holds an
    /// unread value, that value is dropped and reported.
    pub fn set(&self, value: T) {
        let seq = self.write_seq.fetch_add(1, Ordering::AcqRel);
        let idx = (seq % self.slots.len() as u64) as usize;

        let displaced = self.slots[idx].swap(Some(Arc::new(Node { seq, value })));

        if displaced.is_some() {
            self.missed_total.fetch_add(1, Ordering::Relaxed);
            self.pending_missed.fetch_add(1, Ordering::Relaxed);
            if let Some(alert) = &self.alert {
                // Another writer may have already reported our miss;
                // only alert when there is something to report.
                let missed = self.pending_missed.swap(0, Ordering::Relaxed);
                if missed > 0 {
                    alert(missed);
                }
            }
        }

        self.notify.notify_one();
    }

    /// Take the next value in write order, if one is ready
    ///
    /// When the writers have lapped the reader, the cursor clamps to
    /// the oldest surviving value, so everything still in the ring is
    /// delivered in order; the overwritten prefix was already counted
    /// at write time. Only one task may call this.
    pub fn try_next(&self) -> Option<T> {
        let capacity = self.slots.len() as u64;

        loop {
            let mut read_seq = self.read_seq.load(Ordering::Relaxed);
            let write_seq = self.write_seq.load(Ordering::Acquire);

            if write_seq > read_seq + capacity {
                // Lapped: everything below write_seq - capacity is gone
                read_seq = write_seq - capacity;
                self.read_seq.store(read_seq, Ordering::Relaxed);
            }
            if read_seq >= write_seq {
                return None;
            }

            let idx = (read_seq % capacity) as usize;
            {
                let guard = self.slots[idx].load();
                match guard.as_ref() {
                    // The write for `read_seq` is claimed but has not
                    // landed yet (or its slot still holds a previous
                    // lap); try again on the next call.
                    None => return None,
                    Some(node) if node.seq < read_seq => return None,
                    // Writers lapped again between the cursor snapshot
                    // and the slot load; re-clamp.
                    Some(node) if node.seq > read_seq => continue,
                    Some(_) => {}
                }
            }

            // A racing overwrite between the inspection above and this
            // swap hands us a newer node; deliver it rather than lose it.
            let Some(node) = self.slots[idx].swap(None) else {
                return None;
            };
            self.read_seq
                .store(node.seq.max(read_seq) + 1, Ordering::Relaxed);

            return match Arc::try_unwrap(node) {
                Ok(node) => Some(node.value),
                Err(arc) => Some(arc.value.clone()),
            };
        }
    }

    /// Wait for and return the next value in write order
    ///
    /// Blocks cooperatively on the ring's own condition, never on any
    /// downstream consumer. Only one task may call this.
    pub async fn next(&self) -> T {
        loop {
            let notified = self.notify.notified();
            if let Some(value) = self.try_next() {
                return value;
            }
            notified.await;
        }
    }

    /// Drain everything currently readable without waiting
    pub fn drain(&self) -> Vec<T> {
        let mut values = Vec::new();
        while let Some(value) = self.try_next() {
            values.push(value);
        }
        values
    }
}

impl<T> std::fmt::Debug for Diode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diode")
            .field("capacity", &self.slots.len())
            .field("write_seq", &self.write_seq.load(Ordering::Relaxed))
            .field("read_seq", &self.read_seq.load(Ordering::Relaxed))
            .field("missed", &self.missed_total.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
#[path = "diode_test.rs"]
mod tests;
