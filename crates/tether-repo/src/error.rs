//! Repository error types.

use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The repository was not found.
    #[error("repository not found: {0}")]
    NotFound(String),

    /// The repository already exists.
    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    /// A peer descriptor handed to the registry is malformed.
    #[error("invalid peer: {0}")]
    InvalidPeer(#[from] tether_identity::IdentityError),

    /// A repository file could not be parsed or written.
    #[error("invalid repository file {path}: {reason}")]
    Format {
        /// The offending file.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
