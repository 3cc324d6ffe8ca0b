//! # Tether Connector
//!
//! The peer-connectivity core of a Tether node.
//!
//! A [`Connector`] owns one transport [`Layer`](tether_transport::Layer)
//! and the [`Session`]s produced through it. It brings the layer online,
//! admits inbound sessions only from peers in the repository's remotes
//! registry, dials trusted remotes, and tears everything down in order:
//! no session outlives the layer it runs on.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tether_connector::{Connector, ConnectorConfig};
//! use tether_identity::Keypair;
//! use tether_repo::{MemoryRepository, Remote, Repository};
//! use tether_transport::MemoryNetwork;
//!
//! # async fn example(bob: tether_identity::Peer) -> Result<(), Box<dyn std::error::Error>> {
//! let network = MemoryNetwork::new();
//! let keypair = Keypair::generate();
//! let repo = Arc::new(MemoryRepository::with_keypair(keypair.clone(), "alice", "mem://alice"));
//! let layer = Arc::new(network.layer(keypair, repo.peer()));
//!
//! let alice = Connector::new(layer, repo.clone(), ConnectorConfig::default())?;
//! alice.connect().await?;
//!
//! repo.remotes().insert(Remote::from_peer(bob.clone()))?;
//! let session = alice.dial(&bob).await?;
//! println!("bob is at store version {}", session.query_store_version().await?);
//!
//! alice.disconnect().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connector;
mod error;
mod responder;
mod session;

pub use config::{
    ConnectorConfig, DEFAULT_ADMISSION_TIMEOUT, DEFAULT_DIAL_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SESSION_QUEUE,
};
pub use connector::{Connector, ConnectorState, InboundHandler};
pub use error::{ConnectorError, Result, SessionError};
pub use responder::{RepoResponder, Responder};
pub use session::{CloseReason, Direction, Session, ANSWER_BACKLOG, MAX_IN_FLIGHT};
