//! Peer identifiers and descriptors.

use crate::{IdentityError, PublicKey, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum length of a peer name in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// A peer identifier: the raw Ed25519 public key of the node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId([u8; 32]);

impl PeerId {
    /// Creates a peer ID from a public key.
    #[must_use]
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self(*key.as_bytes())
    }

    /// Creates a peer ID from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns a short hex representation.
    #[must_use]
    pub fn short_id(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Returns the full hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_id())
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.short_id())
    }
}

impl FromStr for PeerId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| IdentityError::InvalidPeerId(e.to_string()))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            IdentityError::InvalidPeerId(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }
}

impl Serialize for PeerId {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PeerId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A resolvable descriptor of a node on the network.
///
/// Two descriptors are equal iff they carry the same [`PeerId`]; the name and
/// address are metadata that may change without changing who the peer is.
#[derive(Clone, Serialize, Deserialize)]
pub struct Peer {
    /// The peer's unique identifier.
    pub id: PeerId,
    /// Human readable account name, e.g. `alice@example.org/laptop`.
    pub name: String,
    /// Transport specific address the peer can be dialed at.
    pub addr: String,
}

impl Peer {
    /// Creates a new peer descriptor.
    pub fn new(id: PeerId, name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            addr: addr.into(),
        }
    }

    /// Returns a copy of this descriptor with a different address.
    #[must_use]
    pub fn with_addr(&self, addr: impl Into<String>) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            addr: addr.into(),
        }
    }

    /// Checks that the descriptor is well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::MalformedPeer`] if the name is empty, too long
    /// or contains whitespace/control characters, or if the address is empty.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(IdentityError::MalformedPeer("empty name".into()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(IdentityError::MalformedPeer(format!(
                "name longer than {MAX_NAME_LEN} bytes"
            )));
        }
        if self
            .name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(IdentityError::MalformedPeer(format!(
                "name {:?} contains whitespace or control characters",
                self.name
            )));
        }
        if self.addr.trim().is_empty() {
            return Err(IdentityError::MalformedPeer(format!(
                "peer {} has no address",
                self.name
            )));
        }
        Ok(())
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("addr", &self.addr)
            .finish()
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
