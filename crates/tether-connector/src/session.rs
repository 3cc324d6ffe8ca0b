//! Sessions: one authorized conversation with one remote.
//!
//! A [`Session`] is a cheap, cloneable handle. The channel itself is owned
//! by a single driver task, split in two halves. The reader answers
//! requests from the remote through a [`Responder`] and routes responses
//! back to their callers by request id. It never waits on the writer. The
//! writer sends queued answers and requests, and gives up as soon as the
//! session is stopped.
//!
//! At most [`MAX_IN_FLIGHT`] requests of a session await responses at
//! once. A remote that lets more than [`ANSWER_BACKLOG`] of our answers pile
//! up unread is cut off.
//!
//! A request is either never handed to the driver (cancelled while waiting
//! for queue space) or written in full; if its caller gives up afterwards,
//! the late response is discarded.

use crate::{Responder, SessionError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_identity::Peer;
use tether_protocol::{Frame, ProtocolError, Request, RequestId, Response};
use tether_transport::{Channel, ChannelError, ChannelReader, ChannelWriter};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a closing session tries to say goodbye.
const GOODBYE_TIMEOUT: Duration = Duration::from_millis(500);

/// Requests of one session awaiting a response at the same time.
pub const MAX_IN_FLIGHT: usize = 256;

/// Answers to the remote waiting to be written before the session is cut.
pub const ANSWER_BACKLOG: usize = 4 * MAX_IN_FLIGHT;

/// Why a session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Closed by a local `close` call.
    Local,
    /// The remote said goodbye or hung up.
    Remote,
    /// Revoked by `Connector::disconnect`.
    Revoked,
    /// The transport layer went offline.
    TransportOffline,
    /// The underlying stream failed.
    Broken,
    /// The remote violated the protocol.
    ProtocolViolation,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Local => "closed locally",
            Self::Remote => "closed by remote",
            Self::Revoked => "revoked by connector",
            Self::TransportOffline => "transport offline",
            Self::Broken => "connection broken",
            Self::ProtocolViolation => "protocol violation",
        };
        f.write_str(reason)
    }
}

/// Who opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// We dialed the remote.
    Outbound,
    /// The remote dialed us.
    Inbound,
}

struct Outgoing {
    id: RequestId,
    request: Request,
}

type Answer = (RequestId, Response);

struct Shared {
    id: u64,
    remote: Peer,
    direction: Direction,
    request_timeout: Duration,
    outgoing: mpsc::Sender<Outgoing>,
    in_flight: Semaphore,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
    next_request: AtomicU64,
    close_reason: Mutex<Option<CloseReason>>,
    stop: CancellationToken,
    done: CancellationToken,
}

impl Shared {
    fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Records `reason` unless a reason is already set; returns the one that sticks.
    fn mark_closed(&self, reason: CloseReason) -> CloseReason {
        *self.close_reason.lock().get_or_insert(reason)
    }

    fn closed_error(&self) -> SessionError {
        SessionError::Closed(self.close_reason().unwrap_or(CloseReason::Broken))
    }

    fn was_issued(&self, id: RequestId) -> bool {
        id != 0 && id < self.next_request.load(Ordering::SeqCst)
    }
}

/// Drops the pending slot of a request whose caller went away.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

/// A handle to an open or closed session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Builds a session around `channel`. Nothing runs until the returned
    /// driver is spawned.
    pub(crate) fn open(
        id: u64,
        channel: Channel,
        remote: Peer,
        direction: Direction,
        request_timeout: Duration,
        queue: usize,
        responder: Arc<dyn Responder>,
    ) -> (Self, Driver) {
        let (outgoing, outgoing_rx) = mpsc::channel(queue);
        let shared = Arc::new(Shared {
            id,
            remote,
            direction,
            request_timeout,
            outgoing,
            in_flight: Semaphore::new(MAX_IN_FLIGHT),
            pending: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(1),
            close_reason: Mutex::new(None),
            stop: CancellationToken::new(),
            done: CancellationToken::new(),
        });
        let driver = Driver {
            shared: Arc::clone(&shared),
            channel,
            outgoing: outgoing_rx,
            responder,
            on_close: None,
        };
        (Self { shared }, driver)
    }

    /// Identifier of this session, unique per connector.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The remote peer.
    #[must_use]
    pub fn remote(&self) -> &Peer {
        &self.shared.remote
    }

    /// Who opened the session.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.shared.direction
    }

    /// Whether the session can still carry requests.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.close_reason().is_none()
    }

    /// Why the session closed, if it did.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.close_reason()
    }

    /// Asks the remote for its store version.
    ///
    /// # Errors
    ///
    /// See [`query_store_version_with`](Self::query_store_version_with).
    pub async fn query_store_version(&self) -> Result<u64, SessionError> {
        self.query_store_version_with(&CancellationToken::new()).await
    }

    /// Asks the remote for its store version, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is closed,
    /// [`SessionError::Cancelled`] on cancellation or timeout, and
    /// [`SessionError::Protocol`] if the remote reports a version of 0 or
    /// answers with the wrong response.
    pub async fn query_store_version_with(
        &self,
        cancel: &CancellationToken,
    ) -> Result<u64, SessionError> {
        match self.call(Request::StoreVersion, cancel).await? {
            Response::StoreVersion { version: 0 } => Err(SessionError::Protocol(
                "remote reported store version 0".into(),
            )),
            Response::StoreVersion { version } => Ok(version),
            Response::Error { message } => Err(SessionError::Remote(message)),
            other => Err(unexpected(Request::StoreVersion, &other)),
        }
    }

    /// Measures the round trip to the remote.
    ///
    /// # Errors
    ///
    /// See [`ping_with`](Self::ping_with).
    pub async fn ping(&self) -> Result<Duration, SessionError> {
        self.ping_with(&CancellationToken::new()).await
    }

    /// Measures the round trip to the remote, giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`call`](Self::call), or
    /// [`SessionError::Protocol`] if the echoed nonce does not match.
    pub async fn ping_with(&self, cancel: &CancellationToken) -> Result<Duration, SessionError> {
        let nonce: u64 = rand::random();
        let request = Request::Ping { nonce };
        let started = Instant::now();
        match self.call(request, cancel).await? {
            Response::Pong { nonce: echoed } if echoed == nonce => Ok(started.elapsed()),
            Response::Pong { .. } => Err(SessionError::Protocol("ping nonce mismatch".into())),
            Response::Error { message } => Err(SessionError::Remote(message)),
            other => Err(unexpected(request, &other)),
        }
    }

    /// Sends `request` and waits for its response.
    ///
    /// The wait is bounded by the connector's request timeout and by
    /// `cancel`. Either way the session stays usable.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session is or becomes closed,
    /// and [`SessionError::Cancelled`] on cancellation or timeout.
    pub async fn call(
        &self,
        request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response, SessionError> {
        let shared = &*self.shared;
        if let Some(reason) = shared.close_reason() {
            return Err(SessionError::Closed(reason));
        }

        let id = shared.next_request.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard { shared, id };
        // The driver records the close reason before failing pending
        // requests, so a slot inserted after that point is caught here.
        if let Some(reason) = shared.close_reason() {
            return Err(SessionError::Closed(reason));
        }

        let deadline = tokio::time::sleep(shared.request_timeout);
        tokio::pin!(deadline);

        let _in_flight = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            () = &mut deadline => return Err(SessionError::Cancelled),
            permit = shared.in_flight.acquire() => permit.map_err(|_| shared.closed_error())?,
        };
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(SessionError::Cancelled),
            () = &mut deadline => return Err(SessionError::Cancelled),
            permit = shared.outgoing.reserve() => permit.map_err(|_| shared.closed_error())?,
        };
        permit.send(Outgoing { id, request });

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(session = shared.id, request = id, "Request cancelled");
                Err(SessionError::Cancelled)
            }
            () = &mut deadline => {
                debug!(session = shared.id, request = id, "Request timed out");
                Err(SessionError::Cancelled)
            }
            response = rx => response.map_err(|_| shared.closed_error()),
        }
    }

    /// Closes the session and releases its channel.
    ///
    /// Idempotent: closing a closed session succeeds and keeps the original
    /// close reason.
    ///
    /// # Errors
    ///
    /// Does not fail at present.
    pub async fn close(&self) -> Result<(), SessionError> {
        self.shutdown(CloseReason::Local).await;
        Ok(())
    }

    /// Force-closes the session on behalf of the connector.
    pub(crate) async fn revoke(&self) {
        self.shutdown(CloseReason::Revoked).await;
    }

    async fn shutdown(&self, reason: CloseReason) {
        self.shared.mark_closed(reason);
        self.shared.stop.cancel();
        self.shared.done.cancelled().await;
    }

    /// Resolves once the session is closed and its channel released.
    pub async fn closed(&self) -> CloseReason {
        self.shared.done.cancelled().await;
        self.shared.close_reason().unwrap_or(CloseReason::Broken)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("remote", &self.shared.remote)
            .field("direction", &self.shared.direction)
            .field("close_reason", &self.shared.close_reason())
            .finish()
    }
}

fn unexpected(request: Request, response: &Response) -> SessionError {
    SessionError::Protocol(format!(
        "unexpected response to {}: {response:?}",
        request.name()
    ))
}

type CloseHook = Box<dyn FnOnce(u64, CloseReason) + Send>;

/// The task owning a session's channel.
pub(crate) struct Driver {
    shared: Arc<Shared>,
    channel: Channel,
    outgoing: mpsc::Receiver<Outgoing>,
    responder: Arc<dyn Responder>,
    on_close: Option<CloseHook>,
}

impl Driver {
    /// Runs `hook` once the session is closed, before `close` returns.
    pub(crate) fn on_close(mut self, hook: impl FnOnce(u64, CloseReason) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub(crate) fn spawn(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let Self {
            shared,
            channel,
            mut outgoing,
            responder,
            on_close,
        } = self;
        let (mut reader, mut writer) = channel.split();
        let (answers, mut answers_rx) = mpsc::channel(ANSWER_BACKLOG);

        // Whichever half finishes first ends the session; the other is dropped.
        let reason = tokio::select! {
            reason = read_frames(&shared, &mut reader, &*responder, &answers) => reason,
            reason = write_frames(&shared, &mut writer, &mut outgoing, &mut answers_rx) => reason,
        };
        let reason = shared.mark_closed(reason);

        // Waiters see a dropped sender and report the recorded reason.
        shared.in_flight.close();
        shared.pending.lock().clear();
        outgoing.close();
        drop((reader, writer));

        match reason {
            CloseReason::Local | CloseReason::Remote | CloseReason::Revoked => {
                debug!(session = shared.id, remote = %shared.remote.id, %reason, "Session closed");
            }
            _ => warn!(session = shared.id, remote = %shared.remote.id, %reason, "Session closed"),
        }
        if let Some(hook) = on_close {
            hook(shared.id, reason);
        }
        shared.done.cancel();
    }
}

/// Reads frames until the session ends. Never waits for the writer.
async fn read_frames(
    shared: &Shared,
    reader: &mut ChannelReader,
    responder: &dyn Responder,
    answers: &mpsc::Sender<Answer>,
) -> CloseReason {
    loop {
        let frame = match reader.recv().await {
            Ok(frame) => frame,
            Err(e) => return channel_failure(shared, reader.is_force_closed(), &e),
        };

        match frame {
            Frame::Request { id, request } => {
                let response = responder.respond(&shared.remote, request);
                match answers.try_send((id, response)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!(session = shared.id, backlog = ANSWER_BACKLOG, "Remote is not reading answers");
                        return CloseReason::ProtocolViolation;
                    }
                    Err(TrySendError::Closed(_)) => {
                        return shared.close_reason().unwrap_or(CloseReason::Local);
                    }
                }
            }
            Frame::Response { id, response } => {
                let waiter = shared.pending.lock().remove(&id);
                match waiter {
                    Some(waiter) => {
                        // The caller may have given up in the meantime.
                        let _ = waiter.send(response);
                    }
                    None if shared.was_issued(id) => {
                        debug!(session = shared.id, request = id, "Discarding late response");
                    }
                    None => {
                        warn!(session = shared.id, request = id, "Response to unknown request");
                        return CloseReason::ProtocolViolation;
                    }
                }
            }
            Frame::Goodbye => return CloseReason::Remote,
            other => {
                warn!(session = shared.id, kind = ?other.kind(), "Unexpected frame");
                return CloseReason::ProtocolViolation;
            }
        }
    }
}

/// Writes answers, then requests, until the session is stopped.
///
/// Every write races the stop signal, so a remote that stops reading
/// cannot hold up `close`.
async fn write_frames(
    shared: &Shared,
    writer: &mut ChannelWriter,
    outgoing: &mut mpsc::Receiver<Outgoing>,
    answers: &mut mpsc::Receiver<Answer>,
) -> CloseReason {
    loop {
        let frame = tokio::select! {
            biased;
            () = shared.stop.cancelled() => break,
            Some((id, response)) = answers.recv() => Frame::Response { id, response },
            next = outgoing.recv() => match next {
                Some(Outgoing { id, request }) => Frame::Request { id, request },
                None => return CloseReason::Local,
            },
        };

        let sent = tokio::select! {
            biased;
            () = shared.stop.cancelled() => break,
            sent = writer.send(frame) => sent,
        };
        if let Err(e) = sent {
            return channel_failure(shared, writer.is_force_closed(), &e);
        }
    }

    let _ = tokio::time::timeout(GOODBYE_TIMEOUT, writer.send(Frame::Goodbye)).await;
    shared.close_reason().unwrap_or(CloseReason::Local)
}

fn channel_failure(shared: &Shared, force_closed: bool, error: &ChannelError) -> CloseReason {
    match error {
        ChannelError::Closed if force_closed => CloseReason::TransportOffline,
        ChannelError::Closed => CloseReason::Remote,
        ChannelError::Protocol(ProtocolError::Io(e)) => {
            debug!(session = shared.id, error = %e, "Session stream failed");
            CloseReason::Broken
        }
        ChannelError::Protocol(e) => {
            warn!(session = shared.id, error = %e, "Malformed frame");
            CloseReason::ProtocolViolation
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RepoResponder;
    use tether_identity::Keypair;
    use tether_repo::MemoryRepository;
    use tether_transport::{Layer, MemoryLayer, MemoryNetwork};

    struct Link {
        // Keeps both layers online for the duration of the test.
        _layers: (MemoryLayer, MemoryLayer),
        left: Channel,
        right: Channel,
        right_peer: Peer,
        left_peer: Peer,
    }

    async fn link() -> Link {
        let network = MemoryNetwork::new();
        let left_key = Keypair::generate();
        let right_key = Keypair::generate();
        let left_peer = Peer::new(left_key.peer_id(), "left", "mem://left");
        let right_peer = Peer::new(right_key.peer_id(), "right", "mem://right");
        let left_layer = network.layer(left_key, left_peer.clone());
        let right_layer = network.layer(right_key, right_peer.clone());
        left_layer.online().await.unwrap();
        right_layer.online().await.unwrap();

        let (dialed, accepted) = tokio::join!(left_layer.dial(&right_peer), right_layer.accept());
        Link {
            left: dialed.unwrap(),
            right: accepted.unwrap().0,
            _layers: (left_layer, right_layer),
            right_peer,
            left_peer,
        }
    }

    fn start(channel: Channel, remote: Peer, repo: Arc<MemoryRepository>) -> Session {
        let (session, driver) = Session::open(
            1,
            channel,
            remote,
            Direction::Outbound,
            Duration::from_secs(5),
            8,
            Arc::new(RepoResponder::new(repo)),
        );
        driver.spawn();
        session
    }

    fn repo(name: &str) -> Arc<MemoryRepository> {
        Arc::new(MemoryRepository::new(name, format!("mem://{name}")))
    }

    #[tokio::test]
    async fn both_ends_serve_requests() {
        let link = link().await;
        let right_repo = repo("right");
        right_repo.bump_store_version();
        let left = start(link.left, link.right_peer, repo("left"));
        let right = start(link.right, link.left_peer, right_repo);

        assert_eq!(left.query_store_version().await.unwrap(), 2);
        assert_eq!(right.query_store_version().await.unwrap(), 1);
        assert!(left.ping().await.is_ok());
    }

    #[tokio::test]
    async fn responses_are_matched_by_id() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.ping().await })
        };
        let second = {
            let session = session.clone();
            tokio::spawn(async move { session.query_store_version().await })
        };

        let mut requests = Vec::new();
        for _ in 0..2 {
            match link.right.recv().await.unwrap() {
                Frame::Request { id, request } => requests.push((id, request)),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        // Answer in reverse order.
        for (id, request) in requests.into_iter().rev() {
            let response = match request {
                Request::StoreVersion => Response::StoreVersion { version: 7 },
                Request::Ping { nonce } => Response::Pong { nonce },
            };
            link.right.send(Frame::Response { id, response }).await.unwrap();
        }

        assert!(first.await.unwrap().is_ok());
        assert_eq!(second.await.unwrap(), Ok(7));
    }

    #[tokio::test]
    async fn late_response_is_discarded() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        let cancel = CancellationToken::new();
        let pending = {
            let session = session.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { session.query_store_version_with(&cancel).await })
        };
        let Frame::Request { id, .. } = link.right.recv().await.unwrap() else {
            panic!("expected request");
        };
        cancel.cancel();
        assert_eq!(pending.await.unwrap(), Err(SessionError::Cancelled));

        link.right
            .send(Frame::Response {
                id,
                response: Response::StoreVersion { version: 3 },
            })
            .await
            .unwrap();

        // The session survives and keeps correlating.
        let next = {
            let session = session.clone();
            tokio::spawn(async move { session.query_store_version().await })
        };
        let Frame::Request { id, .. } = link.right.recv().await.unwrap() else {
            panic!("expected request");
        };
        link.right
            .send(Frame::Response {
                id,
                response: Response::StoreVersion { version: 4 },
            })
            .await
            .unwrap();
        assert_eq!(next.await.unwrap(), Ok(4));
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn unknown_response_id_closes_session() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        link.right
            .send(Frame::Response {
                id: 99,
                response: Response::StoreVersion { version: 1 },
            })
            .await
            .unwrap();

        assert_eq!(session.closed().await, CloseReason::ProtocolViolation);
        assert_eq!(
            session.query_store_version().await,
            Err(SessionError::Closed(CloseReason::ProtocolViolation))
        );
    }

    #[tokio::test]
    async fn zero_store_version_is_a_protocol_error() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        let query = {
            let session = session.clone();
            tokio::spawn(async move { session.query_store_version().await })
        };
        let Frame::Request { id, .. } = link.right.recv().await.unwrap() else {
            panic!("expected request");
        };
        link.right
            .send(Frame::Response {
                id,
                response: Response::StoreVersion { version: 0 },
            })
            .await
            .unwrap();

        assert!(matches!(query.await.unwrap(), Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_observed_remotely() {
        let link = link().await;
        let left = start(link.left, link.right_peer, repo("left"));
        let right = start(link.right, link.left_peer, repo("right"));

        left.close().await.unwrap();
        left.close().await.unwrap();
        assert_eq!(left.close_reason(), Some(CloseReason::Local));
        assert_eq!(
            left.ping().await,
            Err(SessionError::Closed(CloseReason::Local))
        );

        assert_eq!(right.closed().await, CloseReason::Remote);
    }

    /// Sends `count` store version requests without reading anything back.
    async fn flood(channel: &mut Channel, count: u64) {
        for id in 1..=count {
            let frame = Frame::Request {
                id,
                request: Request::StoreVersion,
            };
            if channel.send(frame).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_returns_while_remote_stops_reading() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        // More answers than the pipe holds, fewer than the backlog allows.
        flood(&mut link.right, 3_000).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(session.is_open());

        tokio::time::timeout(Duration::from_secs(5), session.close())
            .await
            .expect("close hung on a blocked write")
            .unwrap();
        assert_eq!(session.close_reason(), Some(CloseReason::Local));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn requests_keep_flowing_while_answers_back_up() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));
        flood(&mut link.right, 3_000).await;

        // The right side still sees our request behind its own flood.
        let query = {
            let session = session.clone();
            tokio::spawn(async move { session.query_store_version().await })
        };
        let id = loop {
            match link.right.recv().await.unwrap() {
                Frame::Request { id, .. } => break id,
                Frame::Response { .. } => {}
                other => panic!("unexpected frame {other:?}"),
            }
        };
        link.right
            .send(Frame::Response {
                id,
                response: Response::StoreVersion { version: 9 },
            })
            .await
            .unwrap();
        assert_eq!(query.await.unwrap(), Ok(9));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn remote_ignoring_answers_is_cut_off() {
        let mut link = link().await;
        let session = start(link.left, link.right_peer, repo("left"));

        flood(&mut link.right, 6_000).await;

        let reason = tokio::time::timeout(Duration::from_secs(5), session.closed())
            .await
            .unwrap();
        assert_eq!(reason, CloseReason::ProtocolViolation);
    }

    #[tokio::test]
    async fn request_timeout_cancels() {
        let link = link().await;
        let (session, driver) = Session::open(
            1,
            link.left,
            link.right_peer,
            Direction::Outbound,
            Duration::from_millis(50),
            8,
            Arc::new(RepoResponder::new(repo("left"))),
        );
        driver.spawn();
        // Nobody answers on the right-hand channel.
        let _right = link.right;

        assert_eq!(
            session.query_store_version().await,
            Err(SessionError::Cancelled)
        );
        assert!(session.is_open());
    }
}
