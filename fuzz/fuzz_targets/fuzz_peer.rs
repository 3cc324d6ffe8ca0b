//! Fuzz target for peer descriptor parsing and validation.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tether_identity::{Peer, PeerId, PublicKey};

#[derive(Debug, Arbitrary)]
struct Input {
    id: String,
    key: Vec<u8>,
    name: String,
    addr: String,
}

fuzz_target!(|input: Input| {
    if let Ok(id) = input.id.parse::<PeerId>() {
        assert_eq!(id.to_hex(), input.id.to_lowercase());
    }

    if let Ok(key) = PublicKey::from_bytes(&input.key) {
        let peer = Peer::new(PeerId::from_public_key(&key), input.name, input.addr);
        if peer.validate().is_ok() {
            assert!(!peer.name.is_empty());
            assert!(!peer.addr.is_empty());
        }
    }
});
