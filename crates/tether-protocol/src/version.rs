//! Protocol version carried in every `Hello`.

use crate::{ProtocolError, Result};
use std::fmt;

/// Version spoken by this build.
pub const PROTOCOL_VERSION: Version = Version::new(0, 1, 0);

/// `major.minor.patch`. Peers interoperate iff their majors match; minors
/// only add request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Bumped on wire-incompatible changes.
    pub major: u16,
    /// Bumped when request kinds are added.
    pub minor: u16,
    /// Bumped for fixes.
    pub patch: u16,
}

impl Version {
    /// Size of the encoded form.
    pub const WIRE_LEN: usize = 6;

    /// Builds a version from its parts.
    #[must_use]
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Whether a peer announcing `other` can talk to a peer speaking `self`.
    #[must_use]
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major
    }

    /// Checks a version announced by a remote against [`PROTOCOL_VERSION`].
    ///
    /// # Errors
    ///
    /// [`ProtocolError::IncompatibleVersion`] if the majors differ.
    pub fn ensure_compatible(self) -> Result<()> {
        if PROTOCOL_VERSION.is_compatible_with(&self) {
            Ok(())
        } else {
            Err(ProtocolError::IncompatibleVersion {
                local: PROTOCOL_VERSION,
                remote: self,
            })
        }
    }

    /// Big-endian `major ‖ minor ‖ patch`.
    #[must_use]
    pub fn to_wire(self) -> [u8; Self::WIRE_LEN] {
        let [a, b] = self.major.to_be_bytes();
        let [c, d] = self.minor.to_be_bytes();
        let [e, f] = self.patch.to_be_bytes();
        [a, b, c, d, e, f]
    }

    /// Inverse of [`to_wire`](Self::to_wire).
    #[must_use]
    pub fn from_wire(raw: [u8; Self::WIRE_LEN]) -> Self {
        Self::new(
            u16::from_be_bytes([raw[0], raw[1]]),
            u16::from_be_bytes([raw[2], raw[3]]),
            u16::from_be_bytes([raw[4], raw[5]]),
        )
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
