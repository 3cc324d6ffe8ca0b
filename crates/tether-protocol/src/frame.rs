//! Frame definitions and payload encoding.

use crate::{ProtocolError, Result, Version};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Identifier correlating a response with the request that caused it.
pub type RequestId = u64;

/// Frame kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Handshake: identity announcement and challenge.
    Hello = 0,
    /// Handshake: signature over the peer's challenge.
    HelloAck = 1,
    /// Admission granted by the accepting side.
    Admit = 2,
    /// Admission refused by the accepting side.
    Refuse = 3,
    /// A request.
    Request = 10,
    /// A response to a request.
    Response = 11,
    /// Orderly end of the conversation.
    Goodbye = 12,
}

impl FrameKind {
    /// Parses a frame kind from its byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownKind`] for unassigned bytes.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Hello),
            1 => Ok(Self::HelloAck),
            2 => Ok(Self::Admit),
            3 => Ok(Self::Refuse),
            10 => Ok(Self::Request),
            11 => Ok(Self::Response),
            12 => Ok(Self::Goodbye),
            _ => Err(ProtocolError::UnknownKind(b)),
        }
    }
}

/// Identity announcement sent by both sides at the start of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Protocol version spoken by the sender.
    pub version: Version,
    /// Sender's Ed25519 public key.
    pub public_key: [u8; 32],
    /// Random challenge the receiver has to sign.
    pub nonce: [u8; 32],
    /// Sender's account name.
    pub name: String,
    /// Address the sender can be dialed back at.
    pub addr: String,
}

/// The closed set of requests a session can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Ask for the remote's store version.
    StoreVersion,
    /// Liveness check; the nonce is echoed back.
    Ping {
        /// Value the remote must echo.
        nonce: u64,
    },
}

impl Request {
    const STORE_VERSION: u8 = 1;
    const PING: u8 = 2;

    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StoreVersion => "store_version",
            Self::Ping { .. } => "ping",
        }
    }
}

/// Responses to [`Request`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The remote's store version.
    StoreVersion {
        /// Version number, positive for a healthy store.
        version: u64,
    },
    /// Echo of a ping nonce.
    Pong {
        /// The nonce from the ping.
        nonce: u64,
    },
    /// The remote could not serve the request.
    Error {
        /// Human readable reason.
        message: String,
    },
}

impl Response {
    const STORE_VERSION: u8 = 1;
    const PONG: u8 = 2;
    const ERROR: u8 = 255;
}

/// A single unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Handshake announcement.
    Hello(Hello),
    /// Handshake proof: signature over the peer's nonce.
    HelloAck {
        /// Ed25519 signature bytes.
        signature: [u8; 64],
    },
    /// The accepting side admits the session.
    Admit,
    /// The accepting side refuses the session.
    Refuse {
        /// Why the session was refused.
        reason: String,
    },
    /// A request.
    Request {
        /// Correlation id.
        id: RequestId,
        /// The request.
        request: Request,
    },
    /// A response.
    Response {
        /// Id of the request being answered.
        id: RequestId,
        /// The response.
        response: Response,
    },
    /// Orderly close.
    Goodbye,
}

impl Frame {
    /// Returns the kind of this frame.
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Hello(_) => FrameKind::Hello,
            Self::HelloAck { .. } => FrameKind::HelloAck,
            Self::Admit => FrameKind::Admit,
            Self::Refuse { .. } => FrameKind::Refuse,
            Self::Request { .. } => FrameKind::Request,
            Self::Response { .. } => FrameKind::Response,
            Self::Goodbye => FrameKind::Goodbye,
        }
    }

    /// Writes the payload of this frame (without header) into `buf`.
    pub fn encode_payload(&self, buf: &mut BytesMut) {
        match self {
            Self::Hello(hello) => {
                buf.put_slice(&hello.version.to_wire());
                buf.put_slice(&hello.public_key);
                buf.put_slice(&hello.nonce);
                put_str(buf, &hello.name);
                put_str(buf, &hello.addr);
            }
            Self::HelloAck { signature } => buf.put_slice(signature),
            Self::Admit | Self::Goodbye => {}
            Self::Refuse { reason } => put_str(buf, reason),
            Self::Request { id, request } => {
                buf.put_u64(*id);
                match request {
                    Request::StoreVersion => buf.put_u8(Request::STORE_VERSION),
                    Request::Ping { nonce } => {
                        buf.put_u8(Request::PING);
                        buf.put_u64(*nonce);
                    }
                }
            }
            Self::Response { id, response } => {
                buf.put_u64(*id);
                match response {
                    Response::StoreVersion { version } => {
                        buf.put_u8(Response::STORE_VERSION);
                        buf.put_u64(*version);
                    }
                    Response::Pong { nonce } => {
                        buf.put_u8(Response::PONG);
                        buf.put_u64(*nonce);
                    }
                    Response::Error { message } => {
                        buf.put_u8(Response::ERROR);
                        put_str(buf, message);
                    }
                }
            }
        }
    }

    /// Parses a frame payload of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if the payload is truncated,
    /// carries trailing bytes, or contains an unknown request/response tag.
    pub fn decode_payload(kind: FrameKind, payload: Bytes) -> Result<Self> {
        let mut r = Reader(payload);

        let frame = match kind {
            FrameKind::Hello => {
                let version = Version::from_wire(r.array("version")?);
                let public_key = r.array::<32>("public key")?;
                let nonce = r.array::<32>("nonce")?;
                let name = r.string("name")?;
                let addr = r.string("addr")?;
                Self::Hello(Hello {
                    version,
                    public_key,
                    nonce,
                    name,
                    addr,
                })
            }
            FrameKind::HelloAck => Self::HelloAck {
                signature: r.array::<64>("signature")?,
            },
            FrameKind::Admit => Self::Admit,
            FrameKind::Goodbye => Self::Goodbye,
            FrameKind::Refuse => Self::Refuse {
                reason: r.string("reason")?,
            },
            FrameKind::Request => {
                let id = r.u64("request id")?;
                let request = match r.u8("request tag")? {
                    Request::STORE_VERSION => Request::StoreVersion,
                    Request::PING => Request::Ping {
                        nonce: r.u64("ping nonce")?,
                    },
                    tag => {
                        return Err(ProtocolError::Malformed(format!(
                            "unknown request tag: {tag}"
                        )))
                    }
                };
                Self::Request { id, request }
            }
            FrameKind::Response => {
                let id = r.u64("request id")?;
                let response = match r.u8("response tag")? {
                    Response::STORE_VERSION => Response::StoreVersion {
                        version: r.u64("store version")?,
                    },
                    Response::PONG => Response::Pong {
                        nonce: r.u64("pong nonce")?,
                    },
                    Response::ERROR => Response::Error {
                        message: r.string("error message")?,
                    },
                    tag => {
                        return Err(ProtocolError::Malformed(format!(
                            "unknown response tag: {tag}"
                        )))
                    }
                };
                Self::Response { id, response }
            }
        };

        if r.0.has_remaining() {
            return Err(ProtocolError::Malformed(format!(
                "{} trailing bytes after {kind:?} frame",
                r.0.remaining()
            )));
        }

        Ok(frame)
    }
}

fn put_str(buf: &mut BytesMut, s: &str) {
    let mut len = s.len().min(usize::from(u16::MAX));
    while !s.is_char_boundary(len) {
        len -= 1;
    }
    // len <= u16::MAX by construction
    buf.put_u16(u16::try_from(len).unwrap_or(u16::MAX));
    buf.put_slice(&s.as_bytes()[..len]);
}

/// Bounds-checked cursor over a frame payload.
struct Reader(Bytes);

impl Reader {
    fn need(&self, n: usize, what: &str) -> Result<()> {
        if self.0.remaining() < n {
            return Err(ProtocolError::Malformed(format!("truncated {what}")));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.0.get_u8())
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.need(2, what)?;
        Ok(self.0.get_u16())
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        self.need(8, what)?;
        Ok(self.0.get_u64())
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N]> {
        self.need(N, what)?;
        let mut out = [0u8; N];
        self.0.copy_to_slice(&mut out);
        Ok(out)
    }

    fn string(&mut self, what: &str) -> Result<String> {
        let len = usize::from(self.u16(what)?);
        self.need(len, what)?;
        let raw = self.0.split_to(len);
        String::from_utf8(raw.to_vec())
            .map_err(|e| ProtocolError::Malformed(format!("invalid {what}: {e}")))
    }
}
