//! # Tether Protocol
//!
//! Wire protocol shared by every Tether transport.
//!
//! A channel carries a sequence of [`Frame`]s. The first frames exchanged on
//! a fresh channel are the identity handshake (`Hello`/`HelloAck`), followed
//! by the admission decision of the accepting side (`Admit`/`Refuse`). After
//! admission both sides exchange correlated `Request`/`Response` frames until
//! one of them says `Goodbye` or the channel drops.
//!
//! Frames are delimited by [`FrameCodec`]:
//!
//! ```text
//! +-------+------+-------------+---------+
//! | MAGIC | kind | len (u32be) | payload |
//! |  4 B  | 1 B  |     4 B     |  len B  |
//! +-------+------+-------------+---------+
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod error;
mod frame;
mod version;

pub use codec::FrameCodec;
pub use error::{ProtocolError, Result};
pub use frame::{Frame, FrameKind, Hello, Request, RequestId, Response};
pub use version::{Version, PROTOCOL_VERSION};

/// Magic bytes identifying Tether frames.
pub const MAGIC: [u8; 4] = *b"TETH";

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 9;

/// Maximum frame payload size in bytes (4 MB).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;
