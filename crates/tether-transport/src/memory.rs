//! In-process transport.
//!
//! Layers attached to the same [`MemoryNetwork`] reach each other through
//! in-memory duplex pipes, addressed by the `addr` of their local peer
//! (conventionally `mem://<name>`). Channels behave exactly like network
//! channels: they run the same framing and the same handshake.

use crate::shared::{LayerCore, INBOUND_QUEUE};
use crate::{AcceptError, Channel, DialError, Layer, TransportError};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tether_identity::{Keypair, Peer};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::info;

/// Buffer size of each in-memory pipe.
const PIPE_BUFFER: usize = 64 * 1024;

/// Default time an inbound or outbound handshake may take.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

type Listener = mpsc::Sender<DuplexStream>;

/// A shared switchboard connecting [`MemoryLayer`]s.
///
/// Cloning the network yields another handle to the same switchboard.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<RwLock<HashMap<String, Listener>>>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layer attached to this network.
    #[must_use]
    pub fn layer(&self, keypair: Keypair, local: Peer) -> MemoryLayer {
        MemoryLayer::new(self.clone(), keypair, local)
    }

    /// Whether a layer is online at `addr`.
    #[must_use]
    pub fn is_listening(&self, addr: &str) -> bool {
        self.listeners.read().contains_key(addr)
    }

    /// Number of layers currently online.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    fn bind(&self, addr: &str, listener: Listener) -> Result<(), TransportError> {
        let mut listeners = self.listeners.write();
        if listeners.contains_key(addr) {
            return Err(TransportError::AddressInUse(addr.to_string()));
        }
        listeners.insert(addr.to_string(), listener);
        Ok(())
    }

    fn unbind(&self, addr: &str, listener: &Listener) {
        let mut listeners = self.listeners.write();
        if listeners.get(addr).is_some_and(|l| l.same_channel(listener)) {
            listeners.remove(addr);
        }
    }

    fn lookup(&self, addr: &str) -> Option<Listener> {
        self.listeners.read().get(addr).cloned()
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// A [`Layer`] living on a [`MemoryNetwork`].
pub struct MemoryLayer {
    network: MemoryNetwork,
    core: Arc<LayerCore>,
    bound: Mutex<Option<Listener>>,
}

impl MemoryLayer {
    /// Creates an offline layer for `local`, proving its identity with `keypair`.
    #[must_use]
    pub fn new(network: MemoryNetwork, keypair: Keypair, local: Peer) -> Self {
        Self::with_handshake_timeout(network, keypair, local, DEFAULT_HANDSHAKE_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a custom handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(
        network: MemoryNetwork,
        keypair: Keypair,
        local: Peer,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            network,
            core: Arc::new(LayerCore::new(keypair, local, handshake_timeout)),
            bound: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLayer")
            .field("local", &self.core.local_peer())
            .field("online", &self.core.is_online())
            .field("open_channels", &self.core.open_channels())
            .finish()
    }
}

#[async_trait]
impl Layer for MemoryLayer {
    fn local_peer(&self) -> Peer {
        self.core.local_peer()
    }

    fn is_online(&self) -> bool {
        self.core.is_online()
    }

    fn open_channels(&self) -> usize {
        self.core.open_channels()
    }

    async fn online(&self) -> Result<(), TransportError> {
        let shutdown = self.core.go_online()?;
        let local = self.core.local_peer();

        let (listener, mut incoming) = mpsc::channel::<DuplexStream>(INBOUND_QUEUE);
        if let Err(e) = self.network.bind(&local.addr, listener.clone()) {
            self.core.go_offline().await?;
            return Err(e);
        }
        *self.bound.lock() = Some(listener);

        let core = Arc::clone(&self.core);
        let origin = local.addr.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    stream = incoming.recv() => match stream {
                        Some(stream) => core.admit_inbound(Box::new(stream), origin.clone()),
                        None => break,
                    },
                }
            }
        });
        self.core.track(task);

        info!(peer = %local.id, addr = %local.addr, "Memory layer online");
        Ok(())
    }

    async fn offline(&self) -> Result<(), TransportError> {
        let bound = self.bound.lock().take();
        if let Some(listener) = bound {
            let local = self.core.local_peer();
            self.network.unbind(&local.addr, &listener);
            info!(peer = %local.id, addr = %local.addr, "Memory layer offline");
        }
        self.core.go_offline().await
    }

    async fn dial(&self, peer: &Peer) -> Result<Channel, DialError> {
        let shutdown = self.core.shutdown_token().ok_or(DialError::Offline)?;
        let listener = self
            .network
            .lookup(&peer.addr)
            .ok_or_else(|| DialError::Unreachable(peer.addr.clone()))?;

        let (local, remote) = tokio::io::duplex(PIPE_BUFFER);
        listener
            .send(remote)
            .await
            .map_err(|_| DialError::Unreachable(peer.addr.clone()))?;

        self.core
            .connect_outbound(Box::new(local), peer, shutdown)
            .await
    }

    async fn accept(&self) -> Result<(Channel, Peer), AcceptError> {
        self.core.accept().await
    }
}
