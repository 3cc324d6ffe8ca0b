//! # Tether Repo
//!
//! The repository side of a Tether node: its identity, its store version,
//! and the registry of trusted remotes that gates every session.
//!
//! Two implementations of [`Repository`] are provided: [`MemoryRepository`]
//! for tests and embedders, and [`FsRepository`] which keeps its identity
//! and remotes as YAML files under `<folder>/.tether/`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod fs;
mod remotes;
mod repository;

pub use error::{RepoError, Result};
pub use fs::{FsRepository, RepoConfig, META_DIR};
pub use remotes::{Remote, Remotes};
pub use repository::{MemoryRepository, Repository};
