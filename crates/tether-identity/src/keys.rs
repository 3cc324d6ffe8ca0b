//! Public halves of node keys: verifying keys and signatures.

use crate::{IdentityError, PeerId, Result};
use ed25519_dalek::{Verifier, VerifyingKey};
use std::fmt;

/// A node's Ed25519 verifying key, as carried in a `Hello` frame.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    /// Encoded size.
    pub const LEN: usize = 32;

    pub(crate) fn from_verifying_key(key: VerifyingKey) -> Self {
        Self(key)
    }

    /// Decodes a key received from the network.
    ///
    /// # Errors
    ///
    /// [`IdentityError::InvalidPublicKey`] for a wrong length or a point that
    /// is not on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Ok(raw) = <&[u8; Self::LEN]>::try_from(bytes) else {
            return Err(IdentityError::InvalidPublicKey(format!(
                "{} bytes instead of {}",
                bytes.len(),
                Self::LEN
            )));
        };
        VerifyingKey::from_bytes(raw)
            .map(Self)
            .map_err(|e| IdentityError::InvalidPublicKey(e.to_string()))
    }

    /// Encoded form.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        self.0.as_bytes()
    }

    /// The peer id this key stands for.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(self)
    }

    /// Same as [`PeerId::short_id`].
    #[must_use]
    pub fn short_id(&self) -> String {
        self.peer_id().short_id()
    }

    /// Checks `signature` over `message`.
    ///
    /// # Errors
    ///
    /// [`IdentityError::InvalidSignature`] if the key did not sign `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        self.0
            .verify(message, &signature)
            .map_err(|_| IdentityError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKey").field(&self.short_id()).finish()
    }
}

/// A detached Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Encoded size.
    pub const LEN: usize = 64;

    /// Wraps raw signature bytes. Validity is only known after
    /// [`PublicKey::verify`].
    #[must_use]
    pub const fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Encoded form.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = IdentityError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        <[u8; Self::LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| IdentityError::InvalidSignature)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}..)", hex::encode(&self.0[..6]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Keypair;

    #[test]
    fn decoded_key_verifies_like_the_original() {
        let keypair = Keypair::generate();
        let decoded = PublicKey::from_bytes(keypair.public_key().as_bytes()).unwrap();
        let signature = keypair.sign(b"store version 7");

        assert_eq!(decoded, keypair.public_key());
        assert!(decoded.verify(b"store version 7", &signature).is_ok());
        assert!(decoded.verify(b"store version 8", &signature).is_err());
        assert_eq!(decoded.peer_id(), keypair.peer_id());
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(matches!(
            PublicKey::from_bytes(&[7u8; 31]),
            Err(IdentityError::InvalidPublicKey(_))
        ));
    }

    #[test]
    fn signature_from_slice_checks_length() {
        let signature = Keypair::generate().sign(b"x");
        let parsed = Signature::try_from(&signature.as_bytes()[..]).unwrap();
        assert_eq!(parsed, signature);
        assert!(Signature::try_from(&[0u8; 63][..]).is_err());
    }
}
