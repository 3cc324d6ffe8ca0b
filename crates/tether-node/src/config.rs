//! Node configuration.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `TETHER__*` environment variables (`TETHER__NETWORK__LISTEN_ADDR`,
//! `TETHER__CONNECTOR__DIAL_TIMEOUT_MS`, ...).
//!
//! Network addresses left unset come from the repository's own peer
//! address, the one `tether init --addr` stored and remotes dial.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tether_connector::ConnectorConfig;
use tether_identity::Peer;
use tether_transport::TcpConfig;
use thiserror::Error;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "TETHER";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A source could not be read or deserialized.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Log level for Tether crates.
    pub log_level: String,
    /// Emit JSON logs.
    pub log_json: bool,
    /// Network settings.
    pub network: NetworkConfig,
    /// Connector settings.
    pub connector: ConnectorSettings,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            network: NetworkConfig::default(),
            connector: ConnectorSettings::default(),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to listen on. Defaults to the repository's peer address.
    pub listen_addr: Option<SocketAddr>,
    /// Address announced to peers. Defaults to the repository's peer
    /// address, or to the bound address when `listen_addr` is set.
    pub advertise_addr: Option<String>,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Identity handshake timeout in milliseconds.
    pub handshake_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            advertise_addr: None,
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 5_000,
        }
    }
}

/// Connector timeouts and limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorSettings {
    /// Dial timeout in milliseconds, admission included.
    pub dial_timeout_ms: u64,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Grace period in milliseconds before `disconnect` revokes sessions.
    pub drain_timeout_ms: u64,
    /// Admission timeout in milliseconds.
    pub admission_timeout_ms: u64,
    /// Requests queued per session.
    pub session_queue: usize,
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        let defaults = ConnectorConfig::default();
        Self {
            dial_timeout_ms: millis(defaults.dial_timeout),
            request_timeout_ms: millis(defaults.request_timeout),
            drain_timeout_ms: millis(defaults.drain_timeout),
            admission_timeout_ms: millis(defaults.admission_timeout),
            session_queue: defaults.session_queue,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl NodeConfig {
    /// Loads the configuration from defaults, `path` and the environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a source is malformed or the result is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.log_level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level {:?}",
                self.log_level
            )));
        }
        if self.network.connect_timeout_ms == 0 || self.network.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "network timeouts must be positive".into(),
            ));
        }
        if matches!(&self.network.advertise_addr, Some(addr) if addr.trim().is_empty()) {
            return Err(ConfigError::Invalid("advertise_addr is empty".into()));
        }
        self.connector_config()
            .validate()
            .map_err(ConfigError::Invalid)
    }

    /// Connector tunables.
    #[must_use]
    pub fn connector_config(&self) -> ConnectorConfig {
        let c = &self.connector;
        ConnectorConfig {
            dial_timeout: Duration::from_millis(c.dial_timeout_ms),
            request_timeout: Duration::from_millis(c.request_timeout_ms),
            drain_timeout: Duration::from_millis(c.drain_timeout_ms),
            admission_timeout: Duration::from_millis(c.admission_timeout_ms),
            session_queue: c.session_queue,
        }
    }

    /// TCP layer settings for the node `local`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if no listen address is configured
    /// and none can be derived from `local.addr`.
    pub fn tcp_config(&self, local: &Peer) -> Result<TcpConfig, ConfigError> {
        let network = &self.network;
        let (listen_addr, advertise_addr) = match network.listen_addr {
            Some(addr) => (addr, network.advertise_addr.clone()),
            None => {
                let advertised = network
                    .advertise_addr
                    .clone()
                    .unwrap_or_else(|| local.addr.clone());
                (listen_addr_for(&local.addr)?, Some(advertised))
            }
        };
        Ok(TcpConfig {
            listen_addr,
            advertise_addr,
            connect_timeout: Duration::from_millis(network.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(network.handshake_timeout_ms),
        })
    }
}

/// The socket to bind for a peer reachable at `addr`.
///
/// A host name binds every interface on its port.
fn listen_addr_for(addr: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = addr.parse() {
        return Ok(addr);
    }
    addr.rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
        .ok_or_else(|| ConfigError::Invalid(format!("cannot listen on peer address {addr:?}")))
}
