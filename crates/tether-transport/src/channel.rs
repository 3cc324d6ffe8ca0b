//! Framed, authenticated channels between two peers.

use crate::ChannelError;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_protocol::{Frame, FrameCodec, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Any bidirectional byte stream a backend can put under a channel.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> ByteStream for T {}

/// Counts a channel against its layer for as long as it exists.
pub(crate) struct ChannelLease {
    open: Arc<AtomicUsize>,
}

impl ChannelLease {
    pub(crate) fn acquire(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self { open: Arc::clone(open) }
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

type FramedStream = Framed<Box<dyn ByteStream>, FrameCodec>;

/// A bidirectional frame stream with a remote peer.
///
/// A channel is owned by exactly one session. It is closed by dropping it,
/// and force-closed when its layer goes offline: every pending and future
/// [`recv`](Self::recv) then fails with [`ChannelError::Closed`].
pub struct Channel {
    framed: FramedStream,
    shutdown: CancellationToken,
    _lease: ChannelLease,
}

impl Channel {
    pub(crate) fn new(
        stream: Box<dyn ByteStream>,
        shutdown: CancellationToken,
        lease: ChannelLease,
    ) -> Self {
        Self {
            framed: Framed::new(stream, FrameCodec::new()),
            shutdown,
            _lease: lease,
        }
    }

    /// Sends a frame and flushes it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the layer went offline, or a
    /// protocol error if the write failed.
    pub async fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        send_until(&mut self.framed, &self.shutdown, frame).await
    }

    /// Receives the next frame.
    ///
    /// Cancel safe: dropping the future loses no frame.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the remote hung up or the layer
    /// went offline, or a protocol error on malformed input.
    pub async fn recv(&mut self) -> Result<Frame, ChannelError> {
        recv_until(&mut self.framed, &self.shutdown).await
    }

    /// Splits the channel into halves that can be driven concurrently.
    ///
    /// The channel stays counted against its layer until both halves are
    /// dropped. A force-close fails both.
    #[must_use]
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        let Self {
            framed,
            shutdown,
            _lease: lease,
        } = self;
        let lease = Arc::new(lease);
        let (sink, stream) = framed.split();
        let reader = ChannelReader {
            stream,
            shutdown: shutdown.clone(),
            _lease: Arc::clone(&lease),
        };
        let writer = ChannelWriter {
            sink,
            shutdown,
            _lease: lease,
        };
        (reader, writer)
    }

    /// A token cancelled when the owning layer force-closes this channel.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether the owning layer has force-closed this channel.
    #[must_use]
    pub fn is_force_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("force_closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The receiving half of a [`Channel`].
pub struct ChannelReader {
    stream: SplitStream<FramedStream>,
    shutdown: CancellationToken,
    _lease: Arc<ChannelLease>,
}

impl ChannelReader {
    /// Receives the next frame. Same contract as [`Channel::recv`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] when the remote hung up or the layer
    /// went offline, or a protocol error on malformed input.
    pub async fn recv(&mut self) -> Result<Frame, ChannelError> {
        recv_until(&mut self.stream, &self.shutdown).await
    }

    /// Whether the owning layer has force-closed the channel.
    #[must_use]
    pub fn is_force_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for ChannelReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelReader")
            .field("force_closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// The sending half of a [`Channel`].
pub struct ChannelWriter {
    sink: SplitSink<FramedStream, Frame>,
    shutdown: CancellationToken,
    _lease: Arc<ChannelLease>,
}

impl ChannelWriter {
    /// Sends a frame and flushes it. Same contract as [`Channel::send`].
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the layer went offline, or a
    /// protocol error if the write failed.
    pub async fn send(&mut self, frame: Frame) -> Result<(), ChannelError> {
        send_until(&mut self.sink, &self.shutdown, frame).await
    }

    /// Whether the owning layer has force-closed the channel.
    #[must_use]
    pub fn is_force_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for ChannelWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelWriter")
            .field("force_closed", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn send_until<S>(
    sink: &mut S,
    shutdown: &CancellationToken,
    frame: Frame,
) -> Result<(), ChannelError>
where
    S: futures::Sink<Frame, Error = ProtocolError> + Unpin,
{
    if shutdown.is_cancelled() {
        return Err(ChannelError::Closed);
    }
    tokio::select! {
        () = shutdown.cancelled() => Err(ChannelError::Closed),
        sent = sink.send(frame) => sent.map_err(ChannelError::from),
    }
}

async fn recv_until<S>(stream: &mut S, shutdown: &CancellationToken) -> Result<Frame, ChannelError>
where
    S: futures::Stream<Item = Result<Frame, ProtocolError>> + Unpin,
{
    tokio::select! {
        () = shutdown.cancelled() => Err(ChannelError::Closed),
        next = stream.next() => match next {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(e.into()),
            None => Err(ChannelError::Closed),
        },
    }
}

#[cfg(test)]
pub(crate) fn pair() -> (Channel, Channel, Arc<AtomicUsize>, CancellationToken) {
    let open = Arc::new(AtomicUsize::new(0));
    let shutdown = CancellationToken::new();
    let (a, b) = tokio::io::duplex(64 * 1024);
    let left = Channel::new(Box::new(a), shutdown.clone(), ChannelLease::acquire(&open));
    let right = Channel::new(Box::new(b), shutdown.clone(), ChannelLease::acquire(&open));
    (left, right, open, shutdown)
}
