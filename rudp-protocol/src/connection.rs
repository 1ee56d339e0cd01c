//! RUDP Connection State Machine
//!
//! Manages one point-to-point connection from the three-way handshake
//! through data transfer. The connection performs no I/O: callers feed it
//! received datagrams and the current time, then drain the datagrams it
//! wants sent with [`Connection::poll_transmit`] and the payloads it has
//! delivered with [`Connection::poll_delivered`]. [`Connection::poll_timeout`]
//! tells the caller how long it may block before calling
//! [`Connection::handle_timeout`].
//!
//! ```text
//!            initiator                         responder
//!   Closed ──connect()──▶ SynSent      Closed ──SYN──▶ SynReceived
//!                            │ SYN-ACK                      │ ACK / data
//!                            ▼                              ▼
//!                       Established                    Established
//! ```

use crate::config::{ConfigError, ConnectionConfig};
use crate::packet::{unix_timestamp, Packet, PacketKind};
use crate::receiver::{ReceiveOutcome, ReceiveState};
use crate::sequence::SeqNumber;
use crate::window::{AckOutcome, SendWindow, Transmission, WindowError};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Which side of the handshake this connection plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the SYN
    Initiator,
    /// Waits for a SYN
    Responder,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No handshake in progress
    Closed,
    /// SYN sent, waiting for SYN-ACK (initiator)
    SynSent,
    /// SYN-ACK sent, waiting for ACK (responder)
    SynReceived,
    /// Handshake complete, data may flow
    Established,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "CLOSED"),
            ConnectionState::SynSent => write!(f, "SYN_SENT"),
            ConnectionState::SynReceived => write!(f, "SYN_RECEIVED"),
            ConnectionState::Established => write!(f, "ESTABLISHED"),
        }
    }
}

/// Connection errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Handshake timed out after {attempts} attempts")]
    HandshakeTimeout { attempts: u32 },

    #[error("Delivery failed: packet {seq} unacknowledged after {attempts} transmissions")]
    DeliveryFailed { seq: SeqNumber, attempts: u32 },

    #[error("Connection is not in the correct state ({0})")]
    InvalidState(ConnectionState),

    #[error("Payload of {size} bytes exceeds the maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("No peer address configured")]
    NoPeer,

    #[error("Operation timed out")]
    TimedOut,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WindowError> for ConnectionError {
    fn from(err: WindowError) -> Self {
        match err {
            WindowError::DeliveryFailed { seq, attempts } => {
                ConnectionError::DeliveryFailed { seq, attempts }
            }
        }
    }
}

/// Connection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Datagrams handed to the transport, control packets included
    pub packets_sent: u64,
    /// Valid datagrams received from the peer
    pub packets_received: u64,
    /// Data packets sent for the first time
    pub data_packets_sent: u64,
    /// Data packets sent again after a timeout
    pub packets_retransmitted: u64,
    /// Payload bytes sent for the first time
    pub bytes_sent: u64,
    /// Payload bytes delivered to the application
    pub bytes_received: u64,
    /// Data packets acknowledged by the peer
    pub packets_acked: u64,
    /// Data packets delivered to the application
    pub packets_delivered: u64,
    /// Data packets received again after delivery
    pub duplicates_received: u64,
    /// Data packets received ahead of a gap and discarded
    pub out_of_order_received: u64,
    /// Datagrams dropped for a bad checksum or truncated header
    pub corrupt_dropped: u64,
    /// Datagrams dropped because they came from another address
    pub foreign_dropped: u64,
    /// Acknowledgments that retired nothing
    pub stale_acks: u64,
    /// Acknowledgments covering never-sent sequence numbers
    pub spurious_acks: u64,
    /// FIN packets received (reserved flag, otherwise ignored)
    pub fin_ignored: u64,
    /// SYNs received after the handshake completed
    pub stale_syns: u64,
    /// Most recent round-trip sample
    pub last_rtt: Option<Duration>,
}

/// A datagram the caller must send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    pub destination: SocketAddr,
    pub contents: Bytes,
    pub kind: PacketKind,
}

/// Handshake retransmission bookkeeping
#[derive(Debug, Clone, Copy)]
struct HandshakeProgress {
    attempts: u32,
    last_sent: Instant,
}

/// RUDP Connection
///
/// Represents a single connection with its handshake progress, send window,
/// receive state, and pending output.
#[derive(Debug)]
pub struct Connection {
    role: Role,
    state: ConnectionState,
    config: ConnectionConfig,
    /// Peer given at construction (always set for initiators)
    configured_peer: Option<SocketAddr>,
    /// Peer currently bound to this connection
    peer: Option<SocketAddr>,
    window: SendWindow,
    receiver: ReceiveState,
    handshake: Option<HandshakeProgress>,
    outbox: VecDeque<Transmit>,
    delivered: VecDeque<(Bytes, SocketAddr)>,
    stats: ConnectionStats,
}

impl Connection {
    /// Create a new connection
    ///
    /// An initiator needs a peer. A responder without one accepts the first
    /// SYN from any address and binds to it.
    pub fn new(
        role: Role,
        peer: Option<SocketAddr>,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        config.validate()?;
        if role == Role::Initiator && peer.is_none() {
            return Err(ConnectionError::NoPeer);
        }

        Ok(Connection {
            role,
            state: ConnectionState::Closed,
            window: SendWindow::from_config(&config)?,
            config,
            configured_peer: peer,
            peer,
            receiver: ReceiveState::new(),
            handshake: None,
            outbox: VecDeque::new(),
            delivered: VecDeque::new(),
            stats: ConnectionStats::default(),
        })
    }

    /// Initiator connected to `peer`
    pub fn initiator(peer: SocketAddr, config: ConnectionConfig) -> Result<Self, ConnectionError> {
        Self::new(Role::Initiator, Some(peer), config)
    }

    /// Responder accepting the first SYN it sees
    pub fn responder(config: ConnectionConfig) -> Result<Self, ConnectionError> {
        Self::new(Role::Responder, None, config)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Sequence number the next submitted payload will carry
    pub fn local_seq(&self) -> SeqNumber {
        self.window.next_seq()
    }

    /// Next sequence number expected from the peer
    pub fn local_ack(&self) -> SeqNumber {
        self.receiver.ack_number()
    }

    pub fn in_flight(&self) -> usize {
        self.window.in_flight()
    }

    pub fn queued(&self) -> usize {
        self.window.queued()
    }

    pub fn is_established(&self) -> bool {
        self.state == ConnectionState::Established
    }

    /// All submitted payloads have been acknowledged
    pub fn is_idle(&self) -> bool {
        self.window.is_idle()
    }

    /// Whether the payload packet `seq` has been acknowledged
    pub fn is_delivered(&self, seq: SeqNumber) -> bool {
        seq.lt(self.window.next_seq()) && self.window.is_acknowledged(seq)
    }

    /// Start the handshake (initiator only)
    ///
    /// Does nothing if a handshake is already running or complete.
    pub fn connect(&mut self, now: Instant) -> Result<(), ConnectionError> {
        if self.role != Role::Initiator {
            return Err(ConnectionError::InvalidState(self.state));
        }
        if self.state != ConnectionState::Closed {
            return Ok(());
        }

        tracing::debug!("Sending SYN to {:?}", self.peer);
        self.emit(Packet::syn(self.local_seq(), self.local_ack(), unix_timestamp()));
        self.handshake = Some(HandshakeProgress {
            attempts: 1,
            last_sent: now,
        });
        self.set_state(ConnectionState::SynSent);
        Ok(())
    }

    /// Queue a payload for reliable delivery
    ///
    /// The payload is transmitted as soon as the connection is established
    /// and the window has room. Returns the assigned sequence number.
    pub fn send(&mut self, payload: Bytes, now: Instant) -> Result<SeqNumber, ConnectionError> {
        let max = self.config.max_payload_size();
        if payload.len() > max {
            return Err(ConnectionError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }
        if self.state == ConnectionState::Closed {
            return Err(ConnectionError::InvalidState(self.state));
        }

        let seq = self.window.push(payload);
        if self.is_established() {
            self.flush_window(now);
        }
        Ok(seq)
    }

    /// Process one datagram received from `from`
    ///
    /// Corrupt datagrams and datagrams from addresses other than the peer
    /// are dropped and counted, never reported.
    pub fn handle_datagram(&mut self, datagram: &[u8], from: SocketAddr, now: Instant) {
        let packet = match Packet::from_bytes(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.corrupt_dropped += 1;
                tracing::debug!("Dropping datagram from {}: {}", from, e);
                return;
            }
        };

        if let Some(peer) = self.peer {
            if peer != from {
                self.stats.foreign_dropped += 1;
                tracing::debug!("Dropping {} from unknown address {}", packet.kind(), from);
                return;
            }
        }

        self.stats.packets_received += 1;
        let kind = packet.kind();
        tracing::trace!(
            "Received {} seq={} ack={} len={} in {}",
            kind,
            packet.seq(),
            packet.ack_number(),
            packet.payload.len(),
            self.state
        );

        if kind == PacketKind::Fin {
            self.stats.fin_ignored += 1;
            return;
        }

        match (self.state, kind) {
            (ConnectionState::Closed, PacketKind::Syn) if self.role == Role::Responder => {
                self.peer = Some(from);
                self.accept_syn(now);
            }
            (ConnectionState::Closed, _) => {
                tracing::debug!("Ignoring {} while closed", kind);
            }

            (ConnectionState::SynSent, PacketKind::SynAck) => {
                self.emit_ack();
                self.establish(now);
            }
            (ConnectionState::SynSent, _) => {
                tracing::debug!("Ignoring {} while waiting for SYN-ACK", kind);
            }

            (ConnectionState::SynReceived, PacketKind::Syn) => {
                self.emit_syn_ack();
            }
            (ConnectionState::SynReceived, PacketKind::SynAck) => {}
            (ConnectionState::SynReceived, _) => {
                // ACK, or data after a lost ACK: either completes the handshake
                self.establish(now);
                self.handle_established(packet, now);
            }

            (ConnectionState::Established, PacketKind::Syn) => {
                // late or duplicated handshake SYN
                self.stats.stale_syns += 1;
                tracing::debug!("Ignoring stale SYN from {}", from);
            }
            (ConnectionState::Established, PacketKind::SynAck) => {
                if self.role == Role::Initiator {
                    // our ACK was lost
                    self.emit_ack();
                }
            }
            (ConnectionState::Established, _) => self.handle_established(packet, now),
        }
    }

    /// Drive retransmissions whose deadline has passed
    ///
    /// Fails with `HandshakeTimeout` once the SYN budget is spent and with
    /// `DeliveryFailed` once a payload packet exhausts its retries. Either
    /// way the connection is reset to `Closed`.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Closed => Ok(()),
            ConnectionState::SynSent => {
                let Some(progress) = self.handshake else {
                    return Ok(());
                };
                if now.saturating_duration_since(progress.last_sent) < self.config.retransmit_timeout
                {
                    return Ok(());
                }
                if progress.attempts >= self.config.handshake_attempts {
                    tracing::warn!(
                        "No SYN-ACK from {:?} after {} attempts",
                        self.peer,
                        progress.attempts
                    );
                    self.reset();
                    return Err(ConnectionError::HandshakeTimeout {
                        attempts: progress.attempts,
                    });
                }
                tracing::debug!("Resending SYN (attempt {})", progress.attempts + 1);
                self.emit(Packet::syn(self.local_seq(), self.local_ack(), unix_timestamp()));
                self.handshake = Some(HandshakeProgress {
                    attempts: progress.attempts + 1,
                    last_sent: now,
                });
                Ok(())
            }
            ConnectionState::SynReceived => {
                // Resend SYN-ACK within the budget, then just keep waiting:
                // any later packet from the peer completes the handshake.
                if let Some(progress) = self.handshake {
                    let elapsed = now.saturating_duration_since(progress.last_sent);
                    if elapsed >= self.config.retransmit_timeout {
                        if progress.attempts < self.config.handshake_attempts {
                            self.emit_syn_ack();
                            self.handshake = Some(HandshakeProgress {
                                attempts: progress.attempts + 1,
                                last_sent: now,
                            });
                        } else {
                            self.handshake = None;
                        }
                    }
                }
                Ok(())
            }
            ConnectionState::Established => match self.window.due_retransmissions(now) {
                Ok(due) => {
                    for transmission in due {
                        self.stats.packets_retransmitted += 1;
                        tracing::debug!(
                            "Retransmitting seq={} (attempt {})",
                            transmission.seq,
                            transmission.attempt
                        );
                        self.emit_data(transmission);
                    }
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!("{}, resetting connection", e);
                    self.reset();
                    Err(e.into())
                }
            },
        }
    }

    /// Instant at which [`handle_timeout`](Self::handle_timeout) has work to do
    pub fn poll_timeout(&self) -> Option<Instant> {
        match self.state {
            ConnectionState::Closed => None,
            ConnectionState::SynSent | ConnectionState::SynReceived => self
                .handshake
                .map(|progress| progress.last_sent + self.config.retransmit_timeout),
            ConnectionState::Established => self.window.next_deadline(),
        }
    }

    /// Next datagram to put on the wire
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.outbox.pop_front()
    }

    /// Next payload delivered in order, with the address it came from
    pub fn poll_delivered(&mut self) -> Option<(Bytes, SocketAddr)> {
        self.delivered.pop_front()
    }

    /// Discard all connection state and return to `Closed`
    ///
    /// Nothing is sent to the peer.
    pub fn close(&mut self) {
        tracing::debug!("Closing connection to {:?}", self.peer);
        self.reset();
        self.outbox.clear();
        self.delivered.clear();
    }

    fn reset(&mut self) {
        self.window.reset();
        self.receiver.reset();
        self.handshake = None;
        self.peer = self.configured_peer;
        self.set_state(ConnectionState::Closed);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            tracing::debug!("Connection state {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn accept_syn(&mut self, now: Instant) {
        self.emit_syn_ack();
        self.handshake = Some(HandshakeProgress {
            attempts: 1,
            last_sent: now,
        });
        self.set_state(ConnectionState::SynReceived);
    }

    fn establish(&mut self, now: Instant) {
        self.handshake = None;
        self.set_state(ConnectionState::Established);
        tracing::info!("Connection established with {:?}", self.peer);
        self.flush_window(now);
    }

    fn handle_established(&mut self, packet: Packet, now: Instant) {
        match packet.kind() {
            PacketKind::Ack => self.handle_ack(packet.ack_number(), now),
            PacketKind::Data => self.handle_data(packet),
            _ => {}
        }
    }

    fn handle_ack(&mut self, ack: SeqNumber, now: Instant) {
        match self.window.on_ack(ack, now) {
            AckOutcome::Acknowledged { count, rtt } => {
                self.stats.packets_acked += count as u64;
                if rtt.is_some() {
                    self.stats.last_rtt = rtt;
                }
                tracing::trace!("ACK {} retired {} packets", ack, count);
                self.flush_window(now);
            }
            AckOutcome::Duplicate => {
                self.stats.stale_acks += 1;
                tracing::trace!("Stale ACK {}", ack);
            }
            AckOutcome::OutOfRange => {
                self.stats.spurious_acks += 1;
                tracing::debug!(
                    "Ignoring ACK {} beyond next unsent {}",
                    ack,
                    self.window.next_unsent()
                );
            }
        }
    }

    fn handle_data(&mut self, packet: Packet) {
        match self.receiver.on_data(packet.seq()) {
            ReceiveOutcome::Deliver => {
                self.stats.packets_delivered += 1;
                self.stats.bytes_received += packet.payload.len() as u64;
                if let Some(peer) = self.peer {
                    self.delivered.push_back((packet.payload, peer));
                }
            }
            ReceiveOutcome::Duplicate => {
                self.stats.duplicates_received += 1;
                tracing::debug!("Duplicate data seq={}", packet.seq());
            }
            ReceiveOutcome::OutOfOrder => {
                self.stats.out_of_order_received += 1;
                tracing::debug!(
                    "Out-of-order data seq={}, expecting {}",
                    packet.seq(),
                    self.receiver.ack_number()
                );
            }
        }
        self.emit_ack();
    }

    fn flush_window(&mut self, now: Instant) {
        for transmission in self.window.transmit_ready(now) {
            self.stats.data_packets_sent += 1;
            self.stats.bytes_sent += transmission.payload.len() as u64;
            self.emit_data(transmission);
        }
    }

    fn emit_ack(&mut self) {
        self.emit(Packet::ack(self.local_seq(), self.local_ack(), unix_timestamp()));
    }

    fn emit_syn_ack(&mut self) {
        self.emit(Packet::syn_ack(self.local_seq(), self.local_ack(), unix_timestamp()));
    }

    fn emit_data(&mut self, transmission: Transmission) {
        self.emit(Packet::data(
            transmission.seq,
            self.local_ack(),
            unix_timestamp(),
            transmission.payload,
        ));
    }

    fn emit(&mut self, packet: Packet) {
        let Some(destination) = self.peer else {
            tracing::debug!("No peer for outgoing {}, dropping", packet.kind());
            return;
        };
        let contents: BytesMut = packet.to_bytes();
        tracing::trace!(
            "Sending {} seq={} ack={} to {}",
            packet.kind(),
            packet.seq(),
            packet.ack_number(),
            destination
        );
        self.stats.packets_sent += 1;
        self.outbox.push_back(Transmit {
            destination,
            contents: contents.freeze(),
            kind: packet.kind(),
        });
    }
}
