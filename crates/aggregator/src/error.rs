//! Error types for the aggregator crate

use std::io;
use thiserror::Error;

use carrier_egress::EgressError;
use carrier_protocol::ProtocolError;

/// Errors that can occur while running an aggregator node
#[derive(Error, Debug)]
pub enum AggregatorError {
    /// Failed to bind the ingress listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Egress server error
    #[error(transparent)]
    Egress(#[from] EgressError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for aggregator operations
pub type Result<T> = std::result::Result<T, AggregatorError>;
