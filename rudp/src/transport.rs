//! Datagram transport abstraction
//!
//! RUDP only needs an unreliable, unordered datagram primitive from the
//! layer below. [`RudpSocket`] provides it over real UDP; the in-memory
//! [`SimTransport`](crate::sim::SimTransport) provides it with injected
//! faults for tests.

use rudp_io::RudpSocket;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

/// Unreliable datagram send/receive primitive
///
/// Implementations may lose, duplicate, reorder or corrupt datagrams.
pub trait DatagramTransport {
    /// Send one datagram to `target`
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()>;

    /// Wait at most `timeout` for a datagram, returning its length and source
    fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Address this transport receives on
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl DatagramTransport for RudpSocket {
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        RudpSocket::send_to(self, datagram, target)?;
        Ok(())
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        Ok(self.recv_from_timeout(buf, timeout)?)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(RudpSocket::local_addr(self)?)
    }
}

impl<T: DatagramTransport + ?Sized> DatagramTransport for &T {
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        (**self).send_to(datagram, target)
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        (**self).recv_from(buf, timeout)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }
}
