//! RUDP - Reliable UDP
//!
//! High-level Rust API for RUDP: a blocking [`RudpStream`] that drives the
//! protocol core over any [`DatagramTransport`], a UDP implementation of that
//! transport, and an in-memory fault-injecting one for tests.
//!
//! ```no_run
//! use rudp::{ConnectionConfig, RudpStream};
//! use std::net::Ipv4Addr;
//!
//! # fn main() -> Result<(), rudp::ConnectionError> {
//! let mut stream = RudpStream::connect_udp(
//!     Ipv4Addr::LOCALHOST.into(),
//!     "127.0.0.1:20001".parse().unwrap(),
//!     ConnectionConfig::default().with_local_port(0),
//! )?;
//! stream.send(b"hello")?;
//! # Ok(())
//! # }
//! ```

pub use rudp_io as io;
pub use rudp_protocol as protocol;

pub mod sim;
pub mod stream;
pub mod transport;

// Re-export commonly used types
pub use protocol::{
    ConnectionConfig, ConnectionError, ConnectionState, ConnectionStats, Role, SeqNumber,
};
pub use stream::RudpStream;
pub use transport::DatagramTransport;
