//! RUDP CLI Library
//!
//! Shared functionality for RUDP command-line tools.

pub mod config;
pub mod pipe;
pub mod stats;

pub use config::{Config, ConfigFileError, EndpointConfig, TransportConfig};
pub use pipe::{open_input, open_output};
pub use stats::{display_compact_stats, display_connection_stats, format_bandwidth, format_bytes};

use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug over info.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
