//! Error types for the proxy crate

use std::io;
use thiserror::Error;

use carrier_egress::EgressError;
use carrier_protocol::ProtocolError;

/// Errors that can occur while running the reverse log proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Egress server error
    #[error(transparent)]
    Egress(#[from] EgressError),

    /// Protocol or TLS setup error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error (bind, socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
