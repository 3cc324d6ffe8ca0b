//! Protocol error types.

use crate::Version;
use thiserror::Error;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is malformed.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame exceeds size limits.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// The actual size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// The remote speaks an incompatible protocol version.
    #[error("incompatible protocol version: local {local}, remote {remote}")]
    IncompatibleVersion {
        /// Our version.
        local: Version,
        /// The version announced by the remote.
        remote: Version,
    },

    /// Unknown frame kind byte.
    #[error("unknown frame kind: {0}")]
    UnknownKind(u8),

    /// Invalid magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// The underlying byte stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
