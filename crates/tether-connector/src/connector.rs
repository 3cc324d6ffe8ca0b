//! The connector: a node's network presence and the sessions it owns.

use crate::session::{Direction, Session};
use crate::{ConnectorConfig, ConnectorError, RepoResponder, Responder, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tether_identity::Peer;
use tether_protocol::Frame;
use tether_repo::Repository;
use tether_transport::{AcceptError, Channel, DialError, HandshakeError, Layer};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `disconnect` waits for revoked sessions before taking the
/// layer offline under them.
const REVOKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a [`Connector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    /// Initial and terminal state; the layer is offline.
    Disconnected,
    /// `connect` is bringing the layer online.
    Connecting,
    /// Online: dials are allowed and inbound sessions are admitted.
    Connected,
    /// `disconnect` is tearing sessions and the layer down.
    Disconnecting,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(state)
    }
}

/// Receives sessions opened by trusted remotes.
pub trait InboundHandler: Send + Sync + 'static {
    /// Called once per admitted inbound session. Must not block.
    fn on_session(&self, session: Session);
}

impl<F> InboundHandler for F
where
    F: Fn(Session) + Send + Sync + 'static,
{
    fn on_session(&self, session: Session) {
        self(session);
    }
}

struct AcceptLoop {
    stop: CancellationToken,
    task: JoinHandle<()>,
}

struct Lifecycle {
    state: ConnectorState,
    accept: Option<AcceptLoop>,
}

struct Inner {
    layer: Arc<dyn Layer>,
    repo: Arc<dyn Repository>,
    config: ConnectorConfig,
    responder: Arc<dyn Responder>,
    handler: RwLock<Option<Arc<dyn InboundHandler>>>,
    lifecycle: Mutex<Lifecycle>,
    sessions: Mutex<HashMap<u64, Session>>,
    sessions_changed: Notify,
    next_session: AtomicU64,
}

/// Owns a transport layer and every session produced through it.
///
/// `Connector` is a cheap handle; clones share the same state.
///
/// ```text
/// Disconnected --connect--> Connecting --online--> Connected
///      ^                        |                      |
///      +------- failure --------+                 disconnect
///      |                                               v
///      +----------------------------------------- Disconnecting
/// ```
///
/// Dropping every handle without calling [`disconnect`](Self::disconnect)
/// stops the accept loop but leaves the layer online.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

impl Connector {
    /// Creates a disconnected connector.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::IdentityMismatch`] if the layer does not
    /// speak for the repository's peer.
    pub fn new(
        layer: Arc<dyn Layer>,
        repo: Arc<dyn Repository>,
        config: ConnectorConfig,
    ) -> Result<Self> {
        let (proven, local) = (layer.local_peer().id, repo.peer().id);
        if proven != local {
            return Err(ConnectorError::IdentityMismatch { layer: proven, repo: local });
        }

        let responder = Arc::new(RepoResponder::new(Arc::clone(&repo)));
        Ok(Self {
            inner: Arc::new(Inner {
                layer,
                repo,
                config,
                responder,
                handler: RwLock::new(None),
                lifecycle: Mutex::new(Lifecycle {
                    state: ConnectorState::Disconnected,
                    accept: None,
                }),
                sessions: Mutex::new(HashMap::new()),
                sessions_changed: Notify::new(),
                next_session: AtomicU64::new(1),
            }),
        })
    }

    /// Sets the handler receiving admitted inbound sessions.
    #[must_use]
    pub fn with_inbound_handler(self, handler: impl InboundHandler) -> Self {
        self.set_inbound_handler(handler);
        self
    }

    /// Replaces the handler receiving admitted inbound sessions.
    pub fn set_inbound_handler(&self, handler: impl InboundHandler) {
        *self.inner.handler.write() = Some(Arc::new(handler));
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectorState {
        self.inner.lifecycle.lock().state
    }

    /// The local node as advertised by the layer.
    #[must_use]
    pub fn peer(&self) -> Peer {
        self.inner.layer.local_peer()
    }

    /// The repository this connector serves.
    #[must_use]
    pub fn repo(&self) -> &Arc<dyn Repository> {
        &self.inner.repo
    }

    /// The transport layer.
    #[must_use]
    pub fn layer(&self) -> &Arc<dyn Layer> {
        &self.inner.layer
    }

    /// Number of open sessions, inbound and outbound.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Snapshot of the open sessions.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    /// Brings the layer online and starts admitting inbound sessions.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::StateConflict`] unless disconnected, or
    /// [`ConnectorError::Transport`] if the layer cannot go online, in which
    /// case the connector is disconnected again.
    pub async fn connect(&self) -> Result<()> {
        self.inner.transition(
            "connect",
            ConnectorState::Disconnected,
            ConnectorState::Connecting,
        )?;

        if let Err(e) = self.inner.layer.online().await {
            self.inner.lifecycle.lock().state = ConnectorState::Disconnected;
            warn!(error = %e, "Failed to bring transport online");
            return Err(e.into());
        }

        {
            // Connected before the first inbound channel can be admitted.
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.state = ConnectorState::Connected;
            let stop = CancellationToken::new();
            let task = tokio::spawn(accept_loop(
                Arc::downgrade(&self.inner),
                Arc::clone(&self.inner.layer),
                stop.clone(),
            ));
            lifecycle.accept = Some(AcceptLoop { stop, task });
        }

        let local = self.peer();
        info!(peer = %local.id, name = %local.name, addr = %local.addr, "Connector connected");
        Ok(())
    }

    /// Opens a session with a trusted remote.
    ///
    /// # Errors
    ///
    /// See [`dial_with`](Self::dial_with).
    pub async fn dial(&self, peer: &Peer) -> Result<Session> {
        self.dial_with(peer, &CancellationToken::new()).await
    }

    /// Opens a session with a trusted remote, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// - [`ConnectorError::StateConflict`] unless connected.
    /// - [`ConnectorError::Disconnecting`] if `disconnect` started before the
    ///   session could be registered. A session that was registered is
    ///   closed by that `disconnect` before it returns.
    /// - [`ConnectorError::Unauthorized`] if `peer` is not a trusted remote;
    ///   no network I/O happens in that case.
    /// - [`ConnectorError::Dial`] if the remote is unreachable, refuses the
    ///   session or does not answer within the dial timeout.
    /// - [`ConnectorError::Cancelled`] if `cancel` fires first.
    pub async fn dial_with(&self, peer: &Peer, cancel: &CancellationToken) -> Result<Session> {
        self.inner.ensure_connected("dial")?;
        if !self.inner.repo.remotes().contains(&peer.id) {
            debug!(remote = %peer.id, name = %peer.name, "Refusing to dial untrusted peer");
            return Err(ConnectorError::Unauthorized(peer.id));
        }

        let attempt = timeout(self.inner.config.dial_timeout, self.open_admitted(peer));
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            outcome = attempt => outcome.unwrap_or(Err(DialError::Timeout)),
        };
        let channel = match outcome {
            Ok(channel) => channel,
            // Disconnect took the layer offline under our feet.
            Err(_) if self.state() != ConnectorState::Connected => {
                return Err(ConnectorError::Disconnecting);
            }
            Err(e) => {
                debug!(remote = %peer.id, error = %e, "Dial failed");
                return Err(e.into());
            }
        };

        let session = self.inner.adopt(channel, peer.clone(), Direction::Outbound)?;
        info!(session = session.id(), remote = %peer.id, name = %peer.name, "Session opened");
        Ok(session)
    }

    async fn open_admitted(&self, peer: &Peer) -> std::result::Result<Channel, DialError> {
        let mut channel = self.inner.layer.dial(peer).await?;
        match channel.recv().await {
            Ok(Frame::Admit) => Ok(channel),
            Ok(Frame::Refuse { reason }) => Err(DialError::Refused(reason)),
            Ok(other) => Err(HandshakeError::UnexpectedFrame(other.kind()).into()),
            Err(e) => Err(HandshakeError::Channel(e).into()),
        }
    }

    /// Stops admitting sessions, closes every session and takes the layer
    /// offline.
    ///
    /// Sessions get `drain_timeout` to close on their own; the rest are
    /// revoked. When this returns, every session this connector produced
    /// is closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::StateConflict`] unless connected, or
    /// [`ConnectorError::Transport`] if the layer failed to go offline. The
    /// connector is disconnected either way.
    pub async fn disconnect(&self) -> Result<()> {
        let accept = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.state != ConnectorState::Connected {
                return Err(ConnectorError::StateConflict {
                    operation: "disconnect",
                    state: lifecycle.state,
                });
            }
            lifecycle.state = ConnectorState::Disconnecting;
            lifecycle.accept.take()
        };
        info!(peer = %self.peer().id, sessions = self.session_count(), "Disconnecting");

        if let Some(accept) = accept {
            accept.stop.cancel();
            if let Err(e) = accept.task.await {
                warn!(error = %e, "Accept loop failed");
            }
        }

        if !self.inner.drain(self.inner.config.drain_timeout).await {
            let leftover = self.sessions();
            debug!(sessions = leftover.len(), "Revoking sessions");
            let revoked = futures::future::join_all(leftover.iter().map(Session::revoke));
            if timeout(REVOKE_TIMEOUT, revoked).await.is_err() {
                // Going offline force-closes whatever is still open.
                warn!(sessions = self.session_count(), "Sessions did not close in time");
            }
        }

        let result = self.inner.layer.offline().await;
        if let Err(e) = &result {
            error!(error = %e, "Transport teardown failed");
        }
        self.inner.lifecycle.lock().state = ConnectorState::Disconnected;
        info!(peer = %self.peer().id, "Connector disconnected");

        result.map_err(ConnectorError::from)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("peer", &self.peer())
            .field("state", &self.state())
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn transition(
        &self,
        operation: &'static str,
        from: ConnectorState,
        to: ConnectorState,
    ) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state != from {
            return Err(ConnectorError::StateConflict {
                operation,
                state: lifecycle.state,
            });
        }
        lifecycle.state = to;
        Ok(())
    }

    fn ensure_connected(&self, operation: &'static str) -> Result<()> {
        match self.lifecycle.lock().state {
            ConnectorState::Connected => Ok(()),
            ConnectorState::Disconnecting => Err(ConnectorError::Disconnecting),
            state => Err(ConnectorError::StateConflict { operation, state }),
        }
    }

    /// Wraps an admitted channel into a registered, running session.
    ///
    /// Callers checked that the connector was connected before any I/O, so
    /// any other state here means a `disconnect` got in between.
    fn adopt(self: &Arc<Self>, channel: Channel, remote: Peer, direction: Direction) -> Result<Session> {
        // Held until the session is registered so disconnect cannot miss it.
        let lifecycle = self.lifecycle.lock();
        if lifecycle.state != ConnectorState::Connected {
            return Err(ConnectorError::Disconnecting);
        }

        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let (session, driver) = Session::open(
            id,
            channel,
            remote,
            direction,
            self.config.request_timeout,
            self.config.session_queue,
            Arc::clone(&self.responder),
        );
        self.sessions.lock().insert(id, session.clone());

        let owner = Arc::downgrade(self);
        driver
            .on_close(move |id, _| {
                if let Some(inner) = owner.upgrade() {
                    inner.forget(id);
                }
            })
            .spawn();
        drop(lifecycle);
        Ok(session)
    }

    fn forget(&self, id: u64) {
        self.sessions.lock().remove(&id);
        self.sessions_changed.notify_waiters();
    }

    /// Waits until no session is left or `limit` elapses. Returns whether
    /// every session closed.
    async fn drain(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let changed = self.sessions_changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.sessions.lock().is_empty() {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return self.sessions.lock().is_empty();
            }
        }
    }

    fn handler(&self) -> Option<Arc<dyn InboundHandler>> {
        self.handler.read().clone()
    }

    /// Tells an authenticated inbound peer whether it may open a session.
    async fn admit(self: Arc<Self>, mut channel: Channel, remote: Peer) {
        let limit = self.config.admission_timeout;

        if !self.repo.remotes().contains(&remote.id) {
            warn!(remote = %remote.id, name = %remote.name, "Refusing session from untrusted peer");
            let refusal = Frame::Refuse {
                reason: "not a trusted remote".into(),
            };
            let _ = timeout(limit, channel.send(refusal)).await;
            return;
        }
        if let Err(e) = self.ensure_connected("admit") {
            debug!(remote = %remote.id, name = %remote.name, error = %e, "Refusing session while not connected");
            let refusal = Frame::Refuse {
                reason: "not accepting sessions".into(),
            };
            let _ = timeout(limit, channel.send(refusal)).await;
            return;
        }

        match timeout(limit, channel.send(Frame::Admit)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(remote = %remote.id, error = %e, "Failed to admit session");
                return;
            }
            Err(_) => {
                debug!(remote = %remote.id, "Admission timed out");
                return;
            }
        }

        let name = remote.name.clone();
        match self.adopt(channel, remote, Direction::Inbound) {
            Ok(session) => {
                info!(session = session.id(), remote = %session.remote().id, %name, "Session accepted");
                if let Some(handler) = self.handler() {
                    handler.on_session(session);
                }
            }
            Err(e) => debug!(%name, error = %e, "Dropping admitted session"),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(accept) = self.lifecycle.get_mut().accept.take() {
            accept.stop.cancel();
        }
    }
}

async fn accept_loop(inner: Weak<Inner>, layer: Arc<dyn Layer>, stop: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            accepted = layer.accept() => accepted,
        };
        let (channel, remote) = match accepted {
            Ok(accepted) => accepted,
            Err(AcceptError::ShuttingDown) => break,
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        tokio::spawn(inner.admit(channel, remote));
    }
    debug!("Accept loop stopped");
}
