//! Fuzz target for the wire frame decoder.
//!
//! Tests that arbitrary bytes never panic the decoder and that every frame
//! it accepts survives another encode/decode pass unchanged.

#![no_main]

use bytes::{Bytes, BytesMut};
use libfuzzer_sys::fuzz_target;
use tether_protocol::{Frame, FrameCodec, FrameKind};
use tokio_util::codec::{Decoder, Encoder};

fuzz_target!(|data: &[u8]| {
    let mut codec = FrameCodec::with_max_frame_size(64 * 1024);
    let mut buf = BytesMut::from(data);

    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let mut encoded = BytesMut::new();
        codec
            .encode(frame.clone(), &mut encoded)
            .expect("decoded frame must encode");
        let again = codec
            .decode(&mut encoded)
            .expect("encoded frame must decode")
            .expect("encoded frame is complete");
        assert_eq!(frame, again);
        assert!(encoded.is_empty());
    }

    // payload decoders on their own
    if let Some((&kind, payload)) = data.split_first() {
        if let Ok(kind) = FrameKind::from_byte(kind) {
            let _ = Frame::decode_payload(kind, Bytes::copy_from_slice(payload));
        }
    }
});
