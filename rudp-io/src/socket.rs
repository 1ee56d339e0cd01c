//! UDP socket wrapper for RUDP
//!
//! A blocking UDP socket configured through `socket2`. Receives take a
//! per-call timeout so a connection driver can wait for either the next
//! datagram or its next retransmission deadline, whichever comes first.

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;

/// Shortest read timeout handed to the OS (a zero timeout means "block
/// forever" to `setsockopt`)
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Socket errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<SocketError> for io::Error {
    fn from(err: SocketError) -> Self {
        match err {
            SocketError::Io(e) => e,
        }
    }
}

/// RUDP socket wrapper
///
/// Wraps a blocking UDP socket bound to a local address.
#[derive(Debug)]
pub struct RudpSocket {
    inner: UdpSocket,
}

impl RudpSocket {
    /// Create a new socket bound to the given address
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(false)?;

        let inner: UdpSocket = socket.into();
        tracing::debug!("Bound UDP socket on {:?}", inner.local_addr().ok());
        Ok(RudpSocket { inner })
    }

    /// Set the send buffer size
    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_send_buffer_size(size)?;
        Ok(())
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        SockRef::from(&self.inner).set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Get the send buffer size
    pub fn send_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).send_buffer_size()?)
    }

    /// Get the receive buffer size
    pub fn recv_buffer_size(&self) -> Result<usize, SocketError> {
        Ok(SockRef::from(&self.inner).recv_buffer_size()?)
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        Ok(self.inner.local_addr()?)
    }

    /// Send one datagram to the given address
    pub fn send_to(&self, buf: &[u8], target: SocketAddr) -> Result<usize, SocketError> {
        Ok(self.inner.send_to(buf, target)?)
    }

    /// Wait at most `timeout` for a datagram
    ///
    /// Returns `Ok(None)` when the timeout elapses first. On some platforms
    /// an ICMP port-unreachable from an earlier send surfaces as a reset on
    /// the next receive; that is treated as "nothing received".
    pub fn recv_from_timeout(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<Option<(usize, SocketAddr)>, SocketError> {
        self.inner
            .set_read_timeout(Some(timeout.max(MIN_READ_TIMEOUT)))?;

        match self.inner.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if is_timeout(&e) => Ok(None),
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                tracing::debug!("Ignoring connection reset on UDP receive");
                Ok(None)
            }
            Err(e) => Err(SocketError::Io(e)),
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
