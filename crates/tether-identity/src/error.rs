//! Identity errors.

use thiserror::Error;

/// Why a key, signature or peer descriptor was rejected.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// A signature does not match the key and message.
    #[error("signature verification failed")]
    InvalidSignature,

    /// Bytes announced as a public key are not one.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Stored secret key material is unusable.
    #[error("invalid secret key")]
    InvalidSecretKey,

    /// Text that should be a 64-digit hex peer id.
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    /// A peer descriptor with a bad name or address.
    #[error("malformed peer: {0}")]
    MalformedPeer(String),
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, IdentityError>;
