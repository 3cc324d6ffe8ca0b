//! # Tether Transport
//!
//! Transport layers carry authenticated [`Channel`]s between Tether peers.
//!
//! The [`Layer`] trait is the only thing the connector knows about the
//! network. Two backends are provided:
//!
//! - [`MemoryLayer`]: in-process pipes on a shared [`MemoryNetwork`], used
//!   by tests and simulations.
//! - [`TcpLayer`]: plain TCP sockets.
//!
//! Every channel starts with a mutual identity handshake, so the peer
//! returned by [`Layer::accept`] and the channel returned by
//! [`Layer::dial`] are bound to a key the remote proved it owns.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tether_identity::{Keypair, Peer};
//! use tether_transport::{Layer, MemoryNetwork};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let network = MemoryNetwork::new();
//! let keypair = Keypair::generate();
//! let alice = Peer::new(keypair.peer_id(), "alice", "mem://alice");
//! let layer = network.layer(keypair, alice);
//!
//! layer.online().await?;
//! let (_channel, remote) = layer.accept().await?;
//! println!("{remote} connected");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod shared;
mod error;
mod handshake;
mod layer;
mod memory;
mod tcp;

pub use channel::{ByteStream, Channel, ChannelReader, ChannelWriter};
pub use error::{AcceptError, ChannelError, DialError, HandshakeError, TransportError};
pub use layer::Layer;
pub use memory::{MemoryLayer, MemoryNetwork, DEFAULT_HANDSHAKE_TIMEOUT};
pub use tcp::{TcpConfig, TcpLayer, DEFAULT_PORT};
