//! RUDP I/O and Platform Abstraction
//!
//! This crate provides the blocking UDP socket RUDP runs over and the
//! deadline and timer helpers the drivers use to bound their waits.

pub mod socket;
pub mod time;

pub use socket::{RudpSocket, SocketError};
pub use time::{Deadline, Timer};
