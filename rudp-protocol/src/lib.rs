//! RUDP Protocol Core Implementation
//!
//! This crate implements the transport core of RUDP, a reliable byte-stream
//! protocol over unreliable datagrams: the packet codec, sequence numbers,
//! the sliding send window, in-order receive state, and the sans-I/O
//! connection state machine that ties them together.

pub mod config;
pub mod connection;
pub mod packet;
pub mod receiver;
pub mod sequence;
pub mod window;

pub use config::{ConfigError, ConnectionConfig};
pub use connection::{
    Connection, ConnectionError, ConnectionState, ConnectionStats, Role, Transmit,
};
pub use packet::{CorruptHeader, Packet, PacketFlags, PacketHeader, PacketKind, HEADER_SIZE};
pub use receiver::{ReceiveOutcome, ReceiveState};
pub use sequence::SeqNumber;
pub use window::{AckOutcome, SendWindow, Transmission, WindowError};
