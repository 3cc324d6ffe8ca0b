//! The repository collaborator consumed by the connector.

use crate::Remotes;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_identity::{Keypair, Peer};

/// What a node's networking needs from its repository.
///
/// The repository owns the node identity and the trusted remotes. It is
/// shared between the connector, its accept loop and application code, so
/// every method takes `&self`.
pub trait Repository: Send + Sync + 'static {
    /// The local node's descriptor.
    fn peer(&self) -> Peer;

    /// The local node's signing key.
    fn keypair(&self) -> &Keypair;

    /// The trusted remotes.
    fn remotes(&self) -> &Remotes;

    /// Current version of the local store. Positive for a healthy store.
    fn store_version(&self) -> u64;
}

/// A repository that lives only in memory.
///
/// Used by tests and by applications that manage persistence themselves.
#[derive(Debug)]
pub struct MemoryRepository {
    keypair: Keypair,
    peer: Peer,
    remotes: Remotes,
    store_version: AtomicU64,
}

impl MemoryRepository {
    /// Creates a repository with a fresh identity.
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self::with_keypair(Keypair::generate(), name, addr)
    }

    /// Creates a repository around an existing identity.
    pub fn with_keypair(keypair: Keypair, name: impl Into<String>, addr: impl Into<String>) -> Self {
        let peer = Peer::new(keypair.peer_id(), name, addr);
        Self {
            keypair,
            peer,
            remotes: Remotes::new(),
            store_version: AtomicU64::new(1),
        }
    }

    /// Increments the store version, returning the new value.
    pub fn bump_store_version(&self) -> u64 {
        self.store_version.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Repository for MemoryRepository {
    fn peer(&self) -> Peer {
        self.peer.clone()
    }

    fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    fn remotes(&self) -> &Remotes {
        &self.remotes
    }

    fn store_version(&self) -> u64 {
        self.store_version.load(Ordering::SeqCst)
    }
}
