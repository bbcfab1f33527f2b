//! Error types for the protocol crate

use std::io;
use thiserror::Error;

/// Errors that can occur while encoding, decoding, or validating
/// protocol data.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A request failed validation and must not be retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A frame or message could not be decoded
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A frame exceeded the transport size limit
    #[error("frame size {size} exceeds limit {limit}")]
    FrameTooLarge { size: u32, limit: u32 },

    /// An envelope failed schema validation
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS credential loading or handshake setup failed
    #[error("TLS error: {0}")]
    Tls(String),
}

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
