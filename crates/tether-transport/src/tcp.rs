//! TCP transport.

use crate::shared::LayerCore;
use crate::{AcceptError, Channel, DialError, Layer, TransportError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tether_identity::{Keypair, Peer};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{info, warn};

/// Default port of a Tether node.
pub const DEFAULT_PORT: u16 = 7340;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration of a [`TcpLayer`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub listen_addr: SocketAddr,
    /// Address announced to peers. Defaults to the bound address.
    pub advertise_addr: Option<String>,
    /// Maximum time to establish a TCP connection.
    pub connect_timeout: Duration,
    /// Maximum time for the identity handshake.
    pub handshake_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            advertise_addr: None,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

/// A [`Layer`] over TCP sockets.
pub struct TcpLayer {
    config: TcpConfig,
    core: Arc<LayerCore>,
    bound: Mutex<Option<SocketAddr>>,
}

impl TcpLayer {
    /// Creates an offline layer. The address of `local` is replaced by the
    /// advertised address once the layer is online.
    #[must_use]
    pub fn new(keypair: Keypair, local: Peer, config: TcpConfig) -> Self {
        let local = match &config.advertise_addr {
            Some(addr) => local.with_addr(addr.clone()),
            None => local.with_addr(config.listen_addr.to_string()),
        };
        Self {
            core: Arc::new(LayerCore::new(keypair, local, config.handshake_timeout)),
            config,
            bound: Mutex::new(None),
        }
    }

    /// The bound socket address while online.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.lock()
    }
}

impl std::fmt::Debug for TcpLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLayer")
            .field("config", &self.config)
            .field("bound", &self.local_addr())
            .field("open_channels", &self.core.open_channels())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Layer for TcpLayer {
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

        let bound = match TcpListener::bind(self.config.listen_addr).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                self.core.go_offline().await?;
                return Err(TransportError::Bind {
                    addr: self.config.listen_addr.to_string(),
                    source,
                });
            }
        };

        *self.bound.lock() = Some(addr);
        let advertised = match &self.config.advertise_addr {
            Some(advertised) => advertised.clone(),
            None => {
                if addr.ip().is_unspecified() {
                    warn!(listen_addr = %addr, "Advertising an unspecified address, peers cannot dial it");
                }
                addr.to_string()
            }
        };
        self.core.set_local_addr(advertised);

        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, remote)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!(%remote, error = %e, "Failed to set TCP_NODELAY");
                            }
                            core.admit_inbound(Box::new(stream), remote.to_string());
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },
                }
            }
        });
        self.core.track(task);

        info!(peer = %self.core.local_peer().id, listen_addr = %addr, "TCP layer online");
        Ok(())
    }

    async fn offline(&self) -> Result<(), TransportError> {
        let bound = self.bound.lock().take();
        if let Some(addr) = bound {
            info!(listen_addr = %addr, "TCP layer offline");
        }
        self.core.go_offline().await
    }

    async fn dial(&self, peer: &Peer) -> Result<Channel, DialError> {
        let shutdown = self.core.shutdown_token().ok_or(DialError::Offline)?;

        let stream = match timeout(
            self.config.connect_timeout,
            TcpStream::connect(peer.addr.as_str()),
        )
        .await
        {
            Err(_) => return Err(DialError::Timeout),
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(DialError::Refused(format!("{}: {e}", peer.addr)));
            }
            Ok(Err(e)) => return Err(DialError::Unreachable(format!("{}: {e}", peer.addr))),
            Ok(Ok(stream)) => stream,
        };
        stream.set_nodelay(true)?;

        self.core
            .connect_outbound(Box::new(stream), peer, shutdown)
            .await
    }

    async fn accept(&self) -> Result<(Channel, Peer), AcceptError> {
        self.core.accept().await
    }
}
