//! Ed25519 keypair owned by a node.

use crate::{IdentityError, PeerId, PublicKey, Result, Signature};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// The long-lived signing key of a node.
///
/// The handshake signs the remote's challenge with it, which is what lets the
/// remote derive a [`PeerId`] it can trust.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores a keypair from its 32 secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidSecretKey`] if `bytes` is not 32 bytes long.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret: Zeroizing<[u8; 32]> = Zeroizing::new(
            bytes
                .try_into()
                .map_err(|_| IdentityError::InvalidSecretKey)?,
        );

        Ok(Self {
            signing_key: SigningKey::from_bytes(&secret),
        })
    }

    /// Restores a keypair from a hex encoded secret.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidSecretKey`] on bad hex or length.
    pub fn from_secret_hex(hex_secret: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(hex_secret.trim()).map_err(|_| IdentityError::InvalidSecretKey)?,
        );
        Self::from_secret_bytes(&bytes)
    }

    /// Returns the public key for this keypair.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Returns the peer id this keypair identifies.
    #[must_use]
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(&self.public_key())
    }

    /// Signs a message.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }

    /// Checks a signature made with this keypair.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::InvalidSignature`] if it does not verify.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.public_key().verify(message, signature)
    }

    /// Returns the secret key bytes.
    #[must_use]
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Returns the secret key as lowercase hex, for storage in a repository config.
    #[must_use]
    pub fn secret_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(*self.secret_bytes()))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}
