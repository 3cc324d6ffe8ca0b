//! Proof of key ownership used by the channel handshake.
//!
//! Each side picks a random [`Challenge`] and sends it in the clear; the
//! other side proves it holds the key it announced by signing the challenge
//! under a fixed domain tag, so the signature cannot be replayed as a
//! signature over anything else.

use crate::{IdentityError, Keypair, PublicKey, Result, Signature};

const DOMAIN: &[u8] = b"tether-handshake-v0";

/// A random nonce the remote must sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Challenge([u8; 32]);

impl Challenge {
    /// Draws a fresh challenge.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Wraps a challenge received from the remote.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The nonce as sent on the wire.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Answers the challenge with `keypair`.
    #[must_use]
    pub fn answer(&self, keypair: &Keypair) -> Signature {
        keypair.sign(&self.message())
    }

    /// Checks that `answer` was produced by the owner of `key`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::InvalidSignature`] otherwise.
    pub fn check(&self, key: &PublicKey, answer: &Signature) -> Result<()> {
        key.verify(&self.message(), answer)
            .map_err(|_| IdentityError::InvalidSignature)
    }

    fn message(&self) -> Vec<u8> {
        [DOMAIN, &self.0[..]].concat()
    }
}
