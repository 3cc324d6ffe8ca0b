//! The transport abstraction.

use crate::{AcceptError, Channel, DialError, TransportError};
use async_trait::async_trait;
use tether_identity::Peer;

/// Something that can carry channels between peers.
///
/// A layer starts offline. While online it accepts inbound channels from
/// any peer that completes the identity handshake, and opens channels to
/// peers on request. Authorization is not the layer's concern: the layer
/// only guarantees that the peer returned with a channel owns the key it
/// claims.
///
/// All methods take `&self`; a layer is shared between the connector, its
/// accept loop and every dial in flight.
#[async_trait]
pub trait Layer: Send + Sync + 'static {
    /// The local node as seen by remotes, including the address it is
    /// reachable at.
    fn local_peer(&self) -> Peer;

    /// Whether the layer is currently online.
    fn is_online(&self) -> bool;

    /// Number of channels opened through this layer and not yet dropped.
    fn open_channels(&self) -> usize;

    /// Starts listening.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyOnline`] if the layer is online, or a
    /// backend error if it cannot listen. A failed call leaves the layer
    /// offline.
    async fn online(&self) -> Result<(), TransportError>;

    /// Stops listening, force-closes every channel and fails pending accepts.
    ///
    /// Going offline when already offline is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend task failed during teardown. The layer
    /// is offline afterwards regardless.
    async fn offline(&self) -> Result<(), TransportError>;

    /// Opens a channel to `peer` and verifies that the node answering at
    /// `peer.addr` is `peer.id`.
    ///
    /// # Errors
    ///
    /// Returns [`DialError::Offline`] if the layer is offline, or the reason
    /// the peer could not be reached.
    async fn dial(&self, peer: &Peer) -> Result<Channel, DialError>;

    /// Waits for the next inbound channel and returns it with the
    /// authenticated remote peer.
    ///
    /// # Errors
    ///
    /// Returns [`AcceptError::ShuttingDown`] if the layer is offline or goes
    /// offline while waiting.
    async fn accept(&self) -> Result<(Channel, Peer), AcceptError>;
}
