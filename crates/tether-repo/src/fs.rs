//! File-backed repository.

use crate::{Remote, Remotes, RepoError, Repository, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tether_identity::{Keypair, Peer, PeerId};
use tracing::info;

/// Name of the metadata directory inside a repository folder.
pub const META_DIR: &str = ".tether";

const CONFIG_FILE: &str = "config.yaml";
const REMOTES_FILE: &str = "remotes.yaml";

/// Persistent settings of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Account name of this node.
    pub name: String,
    /// Unique id of this repository.
    pub uuid: String,
    /// Hex encoded Ed25519 secret key.
    pub secret_key: String,
    /// Address the node advertises.
    pub addr: String,
    /// Current store version.
    pub store_version: u64,
}

/// A repository stored in `<folder>/.tether/`.
pub struct FsRepository {
    root: PathBuf,
    keypair: Keypair,
    peer: Peer,
    uuid: String,
    remotes: Remotes,
    store_version: AtomicU64,
    // serializes writers of config.yaml
    config_lock: Mutex<()>,
}

impl FsRepository {
    /// Creates a new repository in `folder`.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::AlreadyExists`] if `folder` already holds a
    /// repository, [`RepoError::InvalidPeer`] if `name`/`addr` do not form a
    /// valid peer, or an I/O error.
    pub fn init(folder: impl AsRef<Path>, name: &str, addr: &str) -> Result<Self> {
        let root = folder.as_ref().to_path_buf();
        let meta = root.join(META_DIR);
        if meta.exists() {
            return Err(RepoError::AlreadyExists(root.display().to_string()));
        }

        let keypair = Keypair::generate();
        Peer::new(keypair.peer_id(), name, addr).validate()?;

        fs::create_dir_all(&meta)?;
        let config = RepoConfig {
            name: name.to_string(),
            uuid: uuid::Uuid::new_v4().to_string(),
            secret_key: keypair.secret_hex().to_string(),
            addr: addr.to_string(),
            store_version: 1,
        };
        write_yaml(&meta.join(CONFIG_FILE), &config)?;
        Remotes::new().save(&meta.join(REMOTES_FILE))?;

        info!(path = %root.display(), peer = %keypair.peer_id(), "Initialized repository");
        Self::open(root)
    }

    /// Opens an existing repository.
    ///
    /// # Errors
    ///
    /// Returns [`RepoError::NotFound`] if there is no repository in `folder`,
    /// or an error if its files are unreadable or malformed.
    pub fn open(folder: impl AsRef<Path>) -> Result<Self> {
        let root = folder.as_ref().to_path_buf();
        let meta = root.join(META_DIR);
        if !meta.is_dir() {
            return Err(RepoError::NotFound(root.display().to_string()));
        }

        let config_path = meta.join(CONFIG_FILE);
        let config: RepoConfig = read_yaml(&config_path)?;
        let keypair =
            Keypair::from_secret_hex(&config.secret_key).map_err(|e| RepoError::Format {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;
        let peer = Peer::new(keypair.peer_id(), config.name, config.addr);
        peer.validate()?;

        let remotes = Remotes::load(&meta.join(REMOTES_FILE))?;

        Ok(Self {
            root,
            keypair,
            peer,
            uuid: config.uuid,
            remotes,
            store_version: AtomicU64::new(config.store_version.max(1)),
            config_lock: Mutex::new(()),
        })
    }

    /// Returns the repository folder.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Returns the repository's unique id.
    #[must_use]
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// Trusts a peer and persists the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer is malformed or the file cannot be written.
    pub fn add_remote(&self, remote: Remote) -> Result<()> {
        self.remotes.insert(remote)?;
        self.save_remotes()
    }

    /// Stops trusting a peer and persists the registry. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn remove_remote(&self, id: &PeerId) -> Result<bool> {
        let removed = self.remotes.remove(id);
        if removed {
            self.save_remotes()?;
        }
        Ok(removed)
    }

    /// Writes the remotes registry to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_remotes(&self) -> Result<()> {
        self.remotes.save(&self.meta_path(REMOTES_FILE))
    }

    /// Increments and persists the store version, returning the new value.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be written.
    pub fn bump_store_version(&self) -> Result<u64> {
        let _guard = self.config_lock.lock();
        let version = self.store_version.fetch_add(1, Ordering::SeqCst) + 1;
        let config = RepoConfig {
            name: self.peer.name.clone(),
            uuid: self.uuid.clone(),
            secret_key: self.keypair.secret_hex().to_string(),
            addr: self.peer.addr.clone(),
            store_version: version,
        };
        write_yaml(&self.meta_path(CONFIG_FILE), &config)?;
        Ok(version)
    }

    fn meta_path(&self, file: &str) -> PathBuf {
        self.root.join(META_DIR).join(file)
    }
}

impl Repository for FsRepository {
    fn peer(&self) -> Peer {
        self.peer.clone()
    }

    fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    fn remotes(&self) -> &Remotes {
        &self.remotes
    }

    fn store_version(&self) -> u64 {
        self.store_version.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FsRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsRepository")
            .field("root", &self.root)
            .field("peer", &self.peer)
            .field("remotes", &self.remotes.len())
            .finish_non_exhaustive()
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| RepoError::Format {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value).map_err(|e| RepoError::Format {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
