//! Transport error types.

use tether_identity::{IdentityError, PeerId};
use tether_protocol::{FrameKind, ProtocolError};
use thiserror::Error;

/// Errors bringing a layer online or offline.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `online` was called on a layer that is already online.
    #[error("layer is already online")]
    AlreadyOnline,

    /// The listener could not be bound.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: String,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The address is already claimed on this network.
    #[error("address already in use: {0}")]
    AddressInUse(String),

    /// A background task of the backend failed during teardown.
    #[error("backend failure: {0}")]
    Backend(String),
}

/// Errors opening an outbound channel.
#[derive(Debug, Error)]
pub enum DialError {
    /// The local layer is offline.
    #[error("layer is offline")]
    Offline,

    /// Nothing is listening at the peer's address.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The remote actively refused the connection or the session.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The remote did not answer in time.
    #[error("dial timed out")]
    Timeout,

    /// The node at the address is not the peer we dialed.
    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch {
        /// The peer we meant to reach.
        expected: PeerId,
        /// The peer that answered.
        actual: PeerId,
    },

    /// The identity handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DialError {
    /// Returns true if retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout | Self::Io(_))
    }
}

/// Errors waiting for an inbound channel.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The layer is offline or going offline.
    #[error("layer is shutting down")]
    ShuttingDown,
}

/// Errors of the identity handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The channel broke or spoke garbage.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The remote sent a frame that does not belong in the handshake.
    #[error("unexpected {0:?} frame during handshake")]
    UnexpectedFrame(FrameKind),

    /// The remote's identity is malformed.
    #[error("invalid remote identity: {0}")]
    Identity(#[from] IdentityError),

    /// The remote could not prove it owns its key.
    #[error("remote failed to prove its identity")]
    BadSignature,

    /// The remote has our own identity.
    #[error("connected to ourselves")]
    SelfConnect,
}

/// Errors on an established channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was closed by either side or by the layer going offline.
    #[error("channel closed")]
    Closed,

    /// Framing or I/O failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
