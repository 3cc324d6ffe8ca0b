//! # Tether Node
//!
//! The `tether` binary: a Tether node backed by a file repository and the
//! TCP transport.
//!
//! Configuration is layered from built-in defaults, an optional YAML file
//! and `TETHER__*` environment variables (see [`config::NodeConfig`]).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod observability;
