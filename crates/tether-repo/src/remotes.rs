//! Registry of trusted remotes.

use crate::{RepoError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tether_identity::{Peer, PeerId};
use tracing::debug;

/// A trusted peer and its local metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remote {
    /// The trusted peer.
    pub peer: Peer,
    /// Optional local nickname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Remote {
    /// Creates a remote record for a peer.
    #[must_use]
    pub fn from_peer(peer: Peer) -> Self {
        Self {
            peer,
            display_name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Returns the remote's peer id.
    #[must_use]
    pub fn id(&self) -> PeerId {
        self.peer.id
    }
}

/// On-disk layout of the remotes file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RemotesFile {
    #[serde(default)]
    remotes: Vec<Remote>,
}

/// The set of peers this node trusts.
///
/// Every authorization decision reads from here, so lookups never touch the
/// disk and the lock is never held while doing I/O. Persistence is explicit
/// through [`Remotes::load`] and [`Remotes::save`].
#[derive(Debug, Default)]
pub struct Remotes {
    inner: RwLock<HashMap<PeerId, Remote>>,
}

impl Remotes {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a remote, or updates the record if the peer is already known.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::InvalidPeer`] if the peer descriptor is malformed.
    pub fn insert(&self, remote: Remote) -> Result<()> {
        remote.peer.validate()?;

        let id = remote.id();
        let previous = self.inner.write().insert(id, remote);
        debug!(peer = %id, updated = previous.is_some(), "Remote inserted");
        Ok(())
    }

    /// Removes a remote. Returns whether it was present.
    pub fn remove(&self, id: &PeerId) -> bool {
        let removed = self.inner.write().remove(id).is_some();
        if removed {
            debug!(peer = %id, "Remote removed");
        }
        removed
    }

    /// Returns true if the peer is trusted.
    #[must_use]
    pub fn contains(&self, id: &PeerId) -> bool {
        self.inner.read().contains_key(id)
    }

    /// Returns the record for a peer.
    #[must_use]
    pub fn get(&self, id: &PeerId) -> Option<Remote> {
        self.inner.read().get(id).cloned()
    }

    /// Finds a remote by peer name or display name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Remote> {
        self.inner
            .read()
            .values()
            .find(|r| r.peer.name == name || r.display_name.as_deref() == Some(name))
            .cloned()
    }

    /// Returns a snapshot of all remotes, sorted by peer name.
    #[must_use]
    pub fn list(&self) -> Vec<Remote> {
        let mut remotes: Vec<Remote> = self.inner.read().values().cloned().collect();
        remotes.sort_by(|a, b| a.peer.name.cmp(&b.peer.name).then(a.id().cmp(&b.id())));
        remotes
    }

    /// Returns the number of remotes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no remotes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Loads a registry from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds a
    /// malformed peer.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: RemotesFile = serde_yaml::from_str(&contents).map_err(|e| RepoError::Format {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let remotes = Self::new();
        for remote in file.remotes {
            remotes.insert(remote)?;
        }
        debug!(path = %path.display(), count = remotes.len(), "Loaded remotes");
        Ok(remotes)
    }

    /// Writes the registry to a YAML file.
    ///
    /// The snapshot is taken first and the lock released before any I/O. The
    /// file is replaced by rename so readers never see a partial write.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = RemotesFile {
            remotes: self.list(),
        };
        let yaml = serde_yaml::to_string(&file).map_err(|e| RepoError::Format {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
