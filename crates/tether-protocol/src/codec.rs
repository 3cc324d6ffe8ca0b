//! Stream framing for [`Frame`]s.

use crate::{Frame, FrameKind, ProtocolError, HEADER_LEN, MAGIC, MAX_FRAME_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Length-prefixed codec turning a byte stream into [`Frame`]s.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a codec with the default frame size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Creates a codec with a custom frame size limit.
    ///
    /// The limit is capped at `u32::MAX`, the largest length a header
    /// can carry.
    #[must_use]
    pub const fn with_max_frame_size(max_frame_size: usize) -> Self {
        let max_frame_size = if max_frame_size > u32::MAX as usize {
            u32::MAX as usize
        } else {
            max_frame_size
        };
        Self { max_frame_size }
    }

    /// The largest payload this codec accepts.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        if src[..4] != MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }
        let kind = FrameKind::from_byte(src[4])?;
        let len = u32::from_be_bytes([src[5], src[6], src[7], src[8]]) as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::TooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Frame::decode_payload(kind, payload).map(Some)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut payload = BytesMut::new();
        item.encode_payload(&mut payload);
        let too_large = || ProtocolError::TooLarge {
            size: payload.len(),
            max: self.max_frame_size,
        };
        if payload.len() > self.max_frame_size {
            return Err(too_large());
        }
        let len = u32::try_from(payload.len()).map_err(|_| too_large())?;

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&MAGIC);
        dst.put_u8(item.kind() as u8);
        dst.put_u32(len);
        dst.put_slice(&payload);
        Ok(())
    }
}
