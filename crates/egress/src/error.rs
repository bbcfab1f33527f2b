//! Error types for the egress crate

use std::io;
use thiserror::Error;

use carrier_protocol::{ErrorCode, ProtocolError};

/// Errors that can occur on the egress surface
#[derive(Error, Debug)]
pub enum EgressError {
    /// Request or codec error from the protocol layer
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The subscriber's socket failed mid-delivery
    #[error("stream terminated unexpectedly")]
    UnexpectedEof,

    /// The server is draining and accepts no new work
    #[error("server is draining")]
    Draining,

    /// No upstream could satisfy the request
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The caller's deadline elapsed before a response was ready
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Failed to bind the egress listener
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EgressError {
    /// The wire status code reported to the peer
    pub fn code(&self) -> ErrorCode {
        match self {
            EgressError::Protocol(ProtocolError::InvalidRequest(_)) => ErrorCode::InvalidArgument,
            EgressError::UnexpectedEof => ErrorCode::UnexpectedEof,
            EgressError::Draining | EgressError::Unavailable(_) => ErrorCode::Unavailable,
            EgressError::DeadlineExceeded => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        }
    }
}

/// Result type for egress operations
pub type Result<T> = std::result::Result<T, EgressError>;
