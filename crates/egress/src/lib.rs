//! Carrier - Egress
//!
//! The subscribe/query server shared by the aggregator and the reverse
//! log proxy. The server owns transport, validation, draining, and the
//! delivery loops; where envelopes and query answers come from is
//! behind the `EnvelopeSource` and `MetricQuerier` seams, so both node
//! types reuse the same machinery with different supplies.

pub mod error;
pub mod server;
pub mod source;

pub use error::{EgressError, Result};
pub use server::{EgressConfig, EgressHandle, EgressServer};
pub use source::{EnvelopeSource, MetricQuerier, SubscriptionStream};
