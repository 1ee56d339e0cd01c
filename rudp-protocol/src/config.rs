//! Per-connection parameters

use crate::packet::{DEFAULT_MAX_DATAGRAM_SIZE, HEADER_SIZE};
use std::time::Duration;
use thiserror::Error;

/// Default rendezvous port
pub const DEFAULT_PORT: u16 = 20001;

/// Default number of unacknowledged packets allowed in flight
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default retransmission timeout
pub const DEFAULT_RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of retransmissions of one packet before giving up
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default number of SYN transmissions before the handshake fails
pub const DEFAULT_HANDSHAKE_ATTEMPTS: u32 = 3;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Window size must be at least 1")]
    ZeroWindow,

    #[error("Retransmit timeout must be non-zero")]
    ZeroTimeout,

    #[error("Handshake attempts must be at least 1")]
    ZeroHandshakeAttempts,

    #[error("Max datagram size {size} leaves no room for payload (header is {header} bytes)")]
    DatagramTooSmall { size: usize, header: usize },
}

/// Connection parameters, fixed at connection creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Local UDP port to bind (0 picks an ephemeral port)
    pub local_port: u16,
    /// Maximum unacknowledged packets in flight
    pub window_size: usize,
    /// Time after which an unacknowledged packet is resent
    pub retransmit_timeout: Duration,
    /// Retransmissions of a single packet before `DeliveryFailed`
    pub max_retries: u32,
    /// SYN transmissions before `HandshakeTimeout`
    pub handshake_attempts: u32,
    /// Largest datagram put on the wire, header included
    pub max_datagram_size: usize,
    /// Socket send buffer size; `None` keeps the OS default
    pub send_buffer_size: Option<usize>,
    /// Socket receive buffer size; `None` keeps the OS default
    pub recv_buffer_size: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            local_port: DEFAULT_PORT,
            window_size: DEFAULT_WINDOW_SIZE,
            retransmit_timeout: DEFAULT_RETRANSMIT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            handshake_attempts: DEFAULT_HANDSHAKE_ATTEMPTS,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

impl ConnectionConfig {
    /// Check that the parameters describe a usable connection
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.retransmit_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.handshake_attempts == 0 {
            return Err(ConfigError::ZeroHandshakeAttempts);
        }
        if self.max_datagram_size <= HEADER_SIZE {
            return Err(ConfigError::DatagramTooSmall {
                size: self.max_datagram_size,
                header: HEADER_SIZE,
            });
        }
        Ok(())
    }

    /// Largest payload a single packet may carry
    pub fn max_payload_size(&self) -> usize {
        self.max_datagram_size.saturating_sub(HEADER_SIZE)
    }

    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_handshake_attempts(mut self, attempts: u32) -> Self {
        self.handshake_attempts = attempts;
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }

    pub fn with_send_buffer_size(mut self, size: usize) -> Self {
        self.send_buffer_size = Some(size);
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = Some(size);
        self
    }
}
