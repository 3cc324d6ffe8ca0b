//! Mutual identity proof run on every fresh channel.
//!
//! Both sides send a `Hello` carrying their public key and a random nonce,
//! then answer with a `HelloAck` holding their signature over the peer's
//! nonce. A side that cannot sign the challenge does not own the key it
//! announced. The exchange is symmetric, so dialer and acceptor run the same
//! code.

use crate::{Channel, HandshakeError};
use tether_identity::{Challenge, Keypair, Peer, PublicKey, Signature};
use tether_protocol::{Frame, Hello};
use tracing::debug;

/// Runs the handshake and returns the authenticated remote peer.
pub(crate) async fn perform(
    channel: &mut Channel,
    keypair: &Keypair,
    local: &Peer,
) -> Result<Peer, HandshakeError> {
    let ours = Challenge::random();
    channel
        .send(Frame::Hello(Hello {
            version: tether_protocol::PROTOCOL_VERSION,
            public_key: *keypair.public_key().as_bytes(),
            nonce: *ours.as_bytes(),
            name: local.name.clone(),
            addr: local.addr.clone(),
        }))
        .await?;

    let hello = match channel.recv().await? {
        Frame::Hello(hello) => hello,
        other => return Err(HandshakeError::UnexpectedFrame(other.kind())),
    };
    hello
        .version
        .ensure_compatible()
        .map_err(crate::ChannelError::Protocol)?;

    let public_key = PublicKey::from_bytes(&hello.public_key)?;
    if public_key == keypair.public_key() {
        return Err(HandshakeError::SelfConnect);
    }

    let answer = Challenge::from_bytes(hello.nonce).answer(keypair);
    channel
        .send(Frame::HelloAck {
            signature: *answer.as_bytes(),
        })
        .await?;

    let signature = match channel.recv().await? {
        Frame::HelloAck { signature } => Signature::from_bytes(signature),
        other => return Err(HandshakeError::UnexpectedFrame(other.kind())),
    };
    ours.check(&public_key, &signature)
        .map_err(|_| HandshakeError::BadSignature)?;

    let remote = Peer::new(public_key.peer_id(), hello.name, hello.addr);
    remote.validate()?;

    debug!(remote = %remote.id, name = %remote.name, "Handshake complete");
    Ok(remote)
}
