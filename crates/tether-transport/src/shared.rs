//! Online state shared by every layer backend.

use crate::channel::{ByteStream, ChannelLease};
use crate::{handshake, AcceptError, Channel, DialError, TransportError};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tether_identity::{Keypair, Peer};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Capacity of the queue of authenticated inbound channels.
pub(crate) const INBOUND_QUEUE: usize = 64;

type Inbound = (Channel, Peer);

/// Resources that live exactly as long as one online period.
struct Online {
    shutdown: CancellationToken,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: Arc<AsyncMutex<mpsc::Receiver<Inbound>>>,
    tasks: Vec<JoinHandle<()>>,
}

pub(crate) struct LayerCore {
    keypair: Keypair,
    local: RwLock<Peer>,
    handshake_timeout: Duration,
    open: Arc<AtomicUsize>,
    online: Mutex<Option<Online>>,
}

impl LayerCore {
    pub(crate) fn new(keypair: Keypair, local: Peer, handshake_timeout: Duration) -> Self {
        Self {
            keypair,
            local: RwLock::new(local),
            handshake_timeout,
            open: Arc::new(AtomicUsize::new(0)),
            online: Mutex::new(None),
        }
    }

    pub(crate) fn local_peer(&self) -> Peer {
        self.local.read().clone()
    }

    pub(crate) fn set_local_addr(&self, addr: String) {
        self.local.write().addr = addr;
    }

    pub(crate) fn is_online(&self) -> bool {
        self.online.lock().is_some()
    }

    pub(crate) fn open_channels(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Token of the current online period, if any.
    pub(crate) fn shutdown_token(&self) -> Option<CancellationToken> {
        self.online.lock().as_ref().map(|o| o.shutdown.clone())
    }

    /// Starts an online period and returns its shutdown token.
    pub(crate) fn go_online(&self) -> Result<CancellationToken, TransportError> {
        let mut online = self.online.lock();
        if online.is_some() {
            return Err(TransportError::AlreadyOnline);
        }
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE);
        let shutdown = CancellationToken::new();
        *online = Some(Online {
            shutdown: shutdown.clone(),
            inbound_tx,
            inbound_rx: Arc::new(AsyncMutex::new(inbound_rx)),
            tasks: Vec::new(),
        });
        Ok(shutdown)
    }

    /// Ends the online period: force-closes channels, stops background tasks
    /// and drops queued inbound channels. No-op when offline.
    pub(crate) async fn go_offline(&self) -> Result<(), TransportError> {
        let online = self.online.lock().take();
        let Some(online) = online else {
            return Ok(());
        };
        online.shutdown.cancel();
        drop(online.inbound_tx);

        let mut failure = None;
        for task in online.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Layer task panicked");
                    failure.get_or_insert_with(|| e.to_string());
                }
            }
        }

        let mut queued = online.inbound_rx.lock().await;
        queued.close();
        while queued.try_recv().is_ok() {}

        match failure {
            Some(reason) => Err(TransportError::Backend(reason)),
            None => Ok(()),
        }
    }

    /// Ties a background task to the current online period.
    pub(crate) fn track(&self, task: JoinHandle<()>) {
        match self.online.lock().as_mut() {
            Some(online) => {
                online.tasks.retain(|t| !t.is_finished());
                online.tasks.push(task);
            }
            None => task.abort(),
        }
    }

    fn wrap(&self, stream: Box<dyn ByteStream>, shutdown: CancellationToken) -> Channel {
        Channel::new(stream, shutdown, ChannelLease::acquire(&self.open))
    }

    /// Authenticates a freshly connected outbound stream.
    pub(crate) async fn connect_outbound(
        &self,
        stream: Box<dyn ByteStream>,
        expected: &Peer,
        shutdown: CancellationToken,
    ) -> Result<Channel, DialError> {
        let mut channel = self.wrap(stream, shutdown);
        let local = self.local_peer();
        let remote = timeout(
            self.handshake_timeout,
            handshake::perform(&mut channel, &self.keypair, &local),
        )
        .await
        .map_err(|_| DialError::Timeout)??;

        if remote.id != expected.id {
            return Err(DialError::IdentityMismatch {
                expected: expected.id,
                actual: remote.id,
            });
        }
        Ok(channel)
    }

    /// Authenticates an inbound stream in the background and queues it for
    /// [`accept`](Self::accept).
    pub(crate) fn admit_inbound(self: &Arc<Self>, stream: Box<dyn ByteStream>, origin: String) {
        let parts = self
            .online
            .lock()
            .as_ref()
            .map(|o| (o.shutdown.clone(), o.inbound_tx.clone()));
        let Some((shutdown, inbound)) = parts else {
            return;
        };

        let core = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut channel = core.wrap(stream, shutdown.clone());
            let local = core.local_peer();
            let outcome = timeout(
                core.handshake_timeout,
                handshake::perform(&mut channel, &core.keypair, &local),
            )
            .await;

            let remote = match outcome {
                Ok(Ok(remote)) => remote,
                Ok(Err(e)) => {
                    debug!(%origin, error = %e, "Inbound handshake failed");
                    return;
                }
                Err(_) => {
                    debug!(%origin, "Inbound handshake timed out");
                    return;
                }
            };

            tokio::select! {
                biased;
                () = shutdown.cancelled() => {}
                queued = inbound.send((channel, remote)) => {
                    if queued.is_err() {
                        debug!(%origin, "Inbound queue closed");
                    }
                }
            }
        });
        self.track(task);
    }

    /// Waits for the next authenticated inbound channel.
    pub(crate) async fn accept(&self) -> Result<Inbound, AcceptError> {
        let (shutdown, inbound) = {
            let online = self.online.lock();
            let online = online.as_ref().ok_or(AcceptError::ShuttingDown)?;
            (online.shutdown.clone(), Arc::clone(&online.inbound_rx))
        };

        let mut inbound = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(AcceptError::ShuttingDown),
            guard = inbound.lock() => guard,
        };
        tokio::select! {
            biased;
            () = shutdown.cancelled() => Err(AcceptError::ShuttingDown),
            next = inbound.recv() => next.ok_or(AcceptError::ShuttingDown),
        }
    }
}
