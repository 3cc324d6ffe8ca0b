//! Connector and session error types.

use crate::{CloseReason, ConnectorState};
use tether_identity::PeerId;
use tether_transport::{DialError, TransportError};
use thiserror::Error;

/// Errors returned by [`Connector`](crate::Connector) operations.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The operation is not valid in the connector's current state.
    #[error("cannot {operation} while {state}")]
    StateConflict {
        /// The attempted operation.
        operation: &'static str,
        /// The state the connector was in.
        state: ConnectorState,
    },

    /// The transport layer failed to come online or go offline.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The remote could not be reached or refused the session.
    #[error("dial failed: {0}")]
    Dial(#[from] DialError),

    /// The peer is not in the remotes registry.
    #[error("peer {0} is not a trusted remote")]
    Unauthorized(PeerId),

    /// The connector started disconnecting while the dial was in flight.
    #[error("connector is disconnecting")]
    Disconnecting,

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The layer proves a different identity than the repository holds.
    #[error("layer speaks for {layer} but the repository belongs to {repo}")]
    IdentityMismatch {
        /// Peer id the layer proves in handshakes.
        layer: PeerId,
        /// Peer id of the repository.
        repo: PeerId,
    },
}

/// Errors returned by [`Session`](crate::Session) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The session is closed.
    #[error("session closed: {0}")]
    Closed(CloseReason),

    /// The request was cancelled or timed out. The session stays usable.
    #[error("request cancelled")]
    Cancelled,

    /// The remote answered with something that does not fit the request.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The remote could not serve the request.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Result type for connector operations.
pub type Result<T> = std::result::Result<T, ConnectorError>;
