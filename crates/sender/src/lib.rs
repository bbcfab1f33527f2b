//! Carrier - Sender
//!
//! Producer-side egress: envelopes written into a local diode are
//! decorated, counter-aggregated, batched, and distributed across a
//! pool of long-lived upstream streams with zone-preferring balancers
//! and randomized stream lifetimes.
//!
//! Loss model: upstream delivery is best effort. A send that cannot
//! find a live stream is dropped and counted, never retried, so
//! producers stay latency-bound no matter what upstream does.

pub mod balancer;
pub mod conn;
pub mod connector;
pub mod error;
pub mod pool;
pub mod tagger;
pub mod transponder;

pub use balancer::{Balancer, zone_balancers};
pub use conn::{ConnConfig, ConnManager, DEFAULT_BASE_TTL, DEFAULT_TTL_JITTER};
pub use connector::Connector;
pub use error::{Result, SenderError};
pub use pool::{ClientPool, DEFAULT_POOL_SIZE};
pub use tagger::Tagger;
pub use transponder::{Transponder, TransponderConfig};
