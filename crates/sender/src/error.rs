//! Error types for the sender crate

use std::io;
use thiserror::Error;

use carrier_protocol::ProtocolError;

/// Errors that can occur on the producer side
#[derive(Error, Debug)]
pub enum SenderError {
    /// Name resolution failed
    #[error("unable to resolve {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Every balancer resolved to an empty address set
    #[error("no addresses resolved")]
    NoAddresses,

    /// No manager currently holds a live stream; the send was dropped
    #[error("no live stream, send dropped")]
    NoLiveStream,

    /// Dial or TLS setup failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error (socket operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for sender operations
pub type Result<T> = std::result::Result<T, SenderError>;
