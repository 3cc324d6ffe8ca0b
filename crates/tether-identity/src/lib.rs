//! # Tether Identity
//!
//! Node identities for the Tether peer network.
//!
//! Every node owns an Ed25519 [`Keypair`]. The public half doubles as the
//! node's [`PeerId`], and a [`Peer`] bundles that id with a human readable
//! account name and a transport address.
//!
//! ## Example
//!
//! ```rust
//! use tether_identity::{Keypair, Peer};
//!
//! let keypair = Keypair::generate();
//! let alice = Peer::new(keypair.peer_id(), "alice@example.org", "mem://alice");
//! assert!(alice.validate().is_ok());
//!
//! let signature = keypair.sign(b"hello");
//! assert!(keypair.public_key().verify(b"hello", &signature).is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod challenge;
mod error;
mod keypair;
mod keys;
mod peer;

pub use challenge::Challenge;
pub use error::{IdentityError, Result};
pub use keypair::Keypair;
pub use keys::{PublicKey, Signature};
pub use peer::{Peer, PeerId, MAX_NAME_LEN};
