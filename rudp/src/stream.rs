//! Blocking RUDP stream
//!
//! [`RudpStream`] drives one [`Connection`] over a [`DatagramTransport`] on
//! the calling thread. Every wait is a bounded receive whose timeout is the
//! earlier of the caller's deadline and the connection's next retransmission
//! timer, so retransmissions happen on time without a busy loop.

use crate::transport::DatagramTransport;
use bytes::Bytes;
use rudp_io::{Deadline, RudpSocket};
use rudp_protocol::{
    Connection, ConnectionConfig, ConnectionError, ConnectionState, ConnectionStats, Role,
    SeqNumber,
};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

/// Receive buffer size; large enough for any UDP datagram
const RECV_BUFFER_SIZE: usize = 65_536;

/// Longest single wait when neither a deadline nor a timer is pending
const IDLE_WAIT: Duration = Duration::from_secs(1);

/// A reliable connection over an unreliable datagram transport
pub struct RudpStream<T: DatagramTransport> {
    transport: T,
    conn: Connection,
    buf: Vec<u8>,
}

impl<T: DatagramTransport> RudpStream<T> {
    /// Wrap a transport without performing the handshake
    ///
    /// The handshake runs implicitly on the first `send` or `receive`.
    pub fn new(
        transport: T,
        role: Role,
        peer: Option<SocketAddr>,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        Ok(RudpStream {
            transport,
            conn: Connection::new(role, peer, config)?,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Connect to `peer` as initiator, blocking until established
    ///
    /// Fails with `HandshakeTimeout` when no SYN-ACK arrives within the
    /// configured number of attempts.
    pub fn connect(
        transport: T,
        peer: SocketAddr,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let mut stream = Self::new(transport, Role::Initiator, Some(peer), config)?;
        stream.handshake(Deadline::never())?;
        Ok(stream)
    }

    /// Wait as responder for a peer to connect
    ///
    /// Fails with `TimedOut` if no handshake completes within `timeout`.
    pub fn accept(
        transport: T,
        config: ConnectionConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, ConnectionError> {
        let mut stream = Self::new(transport, Role::Responder, None, config)?;
        if !stream.handshake(Deadline::from_timeout(timeout))? {
            return Err(ConnectionError::TimedOut);
        }
        Ok(stream)
    }

    /// Reliably send `data`, blocking until every byte is acknowledged
    ///
    /// Data larger than one packet is split into consecutive packets. An
    /// empty slice is sent as one empty data packet.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        self.send_until(data, Deadline::never())
    }

    /// Like [`send`](Self::send) but gives up with `TimedOut` after `timeout`
    ///
    /// On timeout the data stays queued and is still delivered by later
    /// calls that drive the connection.
    pub fn send_timeout(&mut self, data: &[u8], timeout: Duration) -> Result<(), ConnectionError> {
        self.send_until(data, Deadline::after(timeout))
    }

    /// Wait for the next in-order payload
    ///
    /// Returns `Ok(None)` when `timeout` elapses first. `None` waits
    /// indefinitely.
    pub fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Bytes, SocketAddr)>, ConnectionError> {
        let deadline = Deadline::from_timeout(timeout);

        loop {
            if let Some(delivered) = self.conn.poll_delivered() {
                return Ok(Some(delivered));
            }
            if !self.conn.is_established() && !self.handshake(deadline)? {
                return Ok(None);
            }
            if deadline.is_expired(Instant::now()) {
                return Ok(None);
            }
            self.drive(deadline)?;
        }
    }

    /// Block until everything sent so far has been acknowledged
    pub fn flush(&mut self) -> Result<(), ConnectionError> {
        while !self.conn.is_idle() {
            self.drive(Deadline::never())?;
        }
        Ok(())
    }

    /// Discard connection state locally; nothing is sent to the peer
    pub fn close(&mut self) {
        self.conn.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.conn.peer()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ConnectionError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn stats(&self) -> &ConnectionStats {
        self.conn.stats()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn send_until(&mut self, data: &[u8], deadline: Deadline) -> Result<(), ConnectionError> {
        if !self.handshake(deadline)? {
            return Err(ConnectionError::TimedOut);
        }

        let max = self.conn.config().max_payload_size();
        let chunks: Vec<&[u8]> = if data.is_empty() {
            vec![data]
        } else {
            data.chunks(max).collect()
        };

        let now = Instant::now();
        let mut last = SeqNumber::ZERO;
        for chunk in chunks {
            last = self.conn.send(Bytes::copy_from_slice(chunk), now)?;
        }
        self.wait_delivered(last, deadline)
    }

    fn wait_delivered(&mut self, seq: SeqNumber, deadline: Deadline) -> Result<(), ConnectionError> {
        self.flush_transmits()?;

        while !self.conn.is_delivered(seq) {
            if deadline.is_expired(Instant::now()) {
                return Err(ConnectionError::TimedOut);
            }
            self.drive(deadline)?;
        }
        Ok(())
    }

    /// Run the handshake if needed; `false` if the deadline passed first
    fn handshake(&mut self, deadline: Deadline) -> Result<bool, ConnectionError> {
        if self.conn.state() == ConnectionState::Closed && self.conn.role() == Role::Initiator {
            self.conn.connect(Instant::now())?;
        }

        while !self.conn.is_established() {
            if deadline.is_expired(Instant::now()) {
                return Ok(false);
            }
            self.drive(deadline)?;
        }
        Ok(true)
    }

    /// Send pending output, wait for one datagram or timer, process it
    fn drive(&mut self, deadline: Deadline) -> Result<(), ConnectionError> {
        self.flush_transmits()?;

        let now = Instant::now();
        let wait = deadline
            .wait_until(now, self.conn.poll_timeout())
            .unwrap_or(IDLE_WAIT);

        if let Some((n, from)) = self.transport.recv_from(&mut self.buf, wait)? {
            self.conn.handle_datagram(&self.buf[..n], from, Instant::now());
        }
        let result = self.conn.handle_timeout(Instant::now());
        self.flush_transmits()?;
        result
    }

    fn flush_transmits(&mut self) -> Result<(), ConnectionError> {
        while let Some(transmit) = self.conn.poll_transmit() {
            self.transport
                .send_to(&transmit.contents, transmit.destination)?;
        }
        Ok(())
    }
}

impl RudpStream<RudpSocket> {
    /// Bind `ip` on `config.local_port` and connect to `peer`
    pub fn connect_udp(
        ip: IpAddr,
        peer: SocketAddr,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let socket = bind_udp(ip, &config)?;
        Self::connect(socket, peer, config)
    }

    /// Bind `ip` on `config.local_port` and accept one peer
    pub fn accept_udp(
        ip: IpAddr,
        config: ConnectionConfig,
        timeout: Option<Duration>,
    ) -> Result<Self, ConnectionError> {
        let socket = bind_udp(ip, &config)?;
        Self::accept(socket, config, timeout)
    }
}

/// Bind a UDP socket for `config` and apply its buffer sizes
fn bind_udp(ip: IpAddr, config: &ConnectionConfig) -> Result<RudpSocket, ConnectionError> {
    let local = SocketAddr::new(ip, config.local_port);
    let socket = RudpSocket::bind(local).map_err(io::Error::from)?;

    if let Some(size) = config.send_buffer_size {
        socket.set_send_buffer_size(size).map_err(io::Error::from)?;
    }
    if let Some(size) = config.recv_buffer_size {
        socket.set_recv_buffer_size(size).map_err(io::Error::from)?;
    }
    tracing::debug!(
        "Socket buffers: send {:?}, recv {:?}",
        socket.send_buffer_size().ok(),
        socket.recv_buffer_size().ok()
    );
    Ok(socket)
}
