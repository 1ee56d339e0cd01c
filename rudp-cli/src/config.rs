//! Configuration file support for RUDP CLI tools
//!
//! ```toml
//! [endpoint]
//! bind = "127.0.0.1:0"
//! peer = "127.0.0.1:20001"
//!
//! [transport]
//! window_size = 10
//! retransmit_timeout_ms = 1000
//! ```

use rudp_protocol::config::{
    DEFAULT_HANDSHAKE_ATTEMPTS, DEFAULT_MAX_RETRIES, DEFAULT_PORT, DEFAULT_RETRANSMIT_TIMEOUT,
    DEFAULT_WINDOW_SIZE,
};
use rudp_protocol::packet::DEFAULT_MAX_DATAGRAM_SIZE;
use rudp_protocol::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Where this endpoint listens and whom it talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Local bind address
    pub bind: SocketAddr,
    /// Remote address (required for the sender)
    pub peer: Option<SocketAddr>,
    /// Input file path or "-" for stdin
    pub input: String,
    /// Output file path or "-" for stdout
    pub output: String,
    /// Receiver gives up after this long without data
    pub idle_timeout_secs: u64,
    /// Statistics interval in seconds (0 disables periodic reports)
    pub stats_interval_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            bind: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            peer: None,
            input: "-".to_string(),
            output: "-".to_string(),
            idle_timeout_secs: 5,
            stats_interval_secs: 1,
        }
    }
}

impl EndpointConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get statistics interval as Duration
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

/// Reliability parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub window_size: usize,
    pub retransmit_timeout_ms: u64,
    pub max_retries: u32,
    pub handshake_attempts: u32,
    pub max_datagram_size: usize,
    /// Socket send buffer in bytes; OS default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_buffer_size: Option<usize>,
    /// Socket receive buffer in bytes; OS default when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv_buffer_size: Option<usize>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            window_size: DEFAULT_WINDOW_SIZE,
            retransmit_timeout_ms: DEFAULT_RETRANSMIT_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            handshake_attempts: DEFAULT_HANDSHAKE_ATTEMPTS,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint: EndpointConfig,
    pub transport: TransportConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigFileError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigFileError> {
        let config: Config = toml::from_str(contents)?;
        config.connection_config()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigFileError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validated protocol parameters for the bound port
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigFileError> {
        let t = &self.transport;
        let config = ConnectionConfig {
            local_port: self.endpoint.bind.port(),
            window_size: t.window_size,
            retransmit_timeout: Duration::from_millis(t.retransmit_timeout_ms),
            max_retries: t.max_retries,
            handshake_attempts: t.handshake_attempts,
            max_datagram_size: t.max_datagram_size,
            send_buffer_size: t.send_buffer_size,
            recv_buffer_size: t.recv_buffer_size,
        };
        config
            .validate()
            .map_err(|e| ConfigFileError::Invalid(e.to_string()))?;
        Ok(config)
    }

    /// Create example sender configuration
    pub fn example_sender() -> Self {
        Config {
            endpoint: EndpointConfig {
                bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
                peer: Some(SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))),
                ..EndpointConfig::default()
            },
            transport: TransportConfig::default(),
        }
    }

    /// Create example receiver configuration
    pub fn example_receiver() -> Self {
        Config {
            endpoint: EndpointConfig {
                idle_timeout_secs: 10,
                ..EndpointConfig::default()
            },
            transport: TransportConfig::default(),
        }
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
