//! Subscription requests and envelope filters
//!
//! A subscriber names a shard and an optional filter. Members of the
//! same shard form a competing-consumer group: each matching envelope
//! is delivered to exactly one member. The filter is a closed variant
//! set with a total `matches` operation, so the fan-out hot path never
//! needs dynamic dispatch.

use crate::envelope::{Envelope, EnvelopeType};
use crate::error::{ProtocolError, Result};

/// Envelope filter carried by a subscription request
///
/// `None` and an empty source id both mean firehose: every envelope
/// matches. A type filter is only meaningful for a concrete source, so
/// `SourceIdAndType` with an empty source id fails validation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Filter {
    /// Match every envelope
    #[default]
    None,
    /// Match envelopes from one source (empty = firehose)
    SourceId(String),
    /// Match envelopes from one source with one message type
    SourceIdAndType(String, EnvelopeType),
}

impl Filter {
    /// Check whether an envelope passes this filter
    #[inline]
    pub fn matches(&self, envelope: &Envelope) -> bool {
        match self {
            Filter::None => true,
            Filter::SourceId(source_id) => {
                source_id.is_empty() || envelope.source_id == *source_id
            }
            Filter::SourceIdAndType(source_id, envelope_type) => {
                envelope.source_id == *source_id && envelope.envelope_type() == *envelope_type
            }
        }
    }

    /// The source id this filter selects on, if any
    pub fn source_id(&self) -> Option<&str> {
        match self {
            Filter::None => None,
            Filter::SourceId(s) | Filter::SourceIdAndType(s, _) => Some(s),
        }
    }

    /// Reject filter combinations the egress surface does not accept
    pub fn validate(&self) -> Result<()> {
        match self {
            Filter::SourceIdAndType(source_id, _) if source_id.is_empty() => {
                Err(ProtocolError::InvalidRequest(
                    "cannot have type filter without source id".into(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Subscription request sent on the egress surface
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionRequest {
    /// Competing-consumer group id, may be empty (no sharing)
    pub shard_id: String,
    /// Envelope filter
    pub filter: Filter,
    /// Deliver grouped `EnvelopeBatch` frames instead of single envelopes
    pub batched: bool,
}

impl SubscriptionRequest {
    /// Create a firehose request with no shard
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shard id
    pub fn with_shard(mut self, shard_id: impl Into<String>) -> Self {
        self.shard_id = shard_id.into();
        self
    }

    /// Set the filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Request batched delivery
    pub fn batched(mut self) -> Self {
        self.batched = true;
        self
    }

    /// Validate the request; a failure is permanent and must be
    /// surfaced to the subscriber synchronously
    pub fn validate(&self) -> Result<()> {
        self.filter.validate()
    }
}

#[cfg(test)]
#[path = "request_test.rs"]
mod tests;
