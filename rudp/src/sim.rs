//! In-memory datagram transport with fault injection
//!
//! [`SimTransport::pair`] links two endpoints through `crossbeam` channels.
//! Each direction applies its own [`FaultPlan`] and every datagram handed
//! to a transport is recorded, with its send instant and fate, in a
//! [`CaptureLog`] shared by both ends.
//!
//! ```
//! use rudp::sim::{FaultPlan, SimTransport};
//! use rudp::transport::DatagramTransport;
//!
//! let (a, b) = SimTransport::pair_with_faults(
//!     "10.0.0.1:1000".parse().unwrap(),
//!     FaultPlan::new().drop_nth(1),
//!     "10.0.0.2:2000".parse().unwrap(),
//!     FaultPlan::new(),
//! );
//! assert_eq!(a.peer_addr(), b.local_addr().unwrap());
//! ```

use crate::transport::DatagramTransport;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rudp_protocol::packet::{Packet, PacketKind};
use rudp_protocol::SeqNumber;
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Faults applied to one direction of a simulated link
///
/// Datagram indices are 1-based and count every datagram sent in that
/// direction, control packets included.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    drop_nth: HashSet<u64>,
    drop_first_data: HashSet<u32>,
    duplicate_nth: HashSet<u64>,
    corrupt_nth: HashSet<u64>,
    hold_nth: HashSet<u64>,
    loss_probability: f64,
    seed: u64,
    drop_all: bool,
}

impl FaultPlan {
    /// A perfect link
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the `n`th datagram
    pub fn drop_nth(mut self, n: u64) -> Self {
        self.drop_nth.insert(n);
        self
    }

    /// Drop the first transmission of the data packet carrying `seq`;
    /// retransmissions pass
    pub fn drop_first_transmission(mut self, seq: u32) -> Self {
        self.drop_first_data.insert(seq);
        self
    }

    /// Deliver the `n`th datagram twice
    pub fn duplicate_nth(mut self, n: u64) -> Self {
        self.duplicate_nth.insert(n);
        self
    }

    /// Flip one header bit of the `n`th datagram
    pub fn corrupt_nth(mut self, n: u64) -> Self {
        self.corrupt_nth.insert(n);
        self
    }

    /// Hold back the `n`th datagram until the next one has been delivered
    pub fn reorder_nth(mut self, n: u64) -> Self {
        self.hold_nth.insert(n);
        self
    }

    /// Drop each datagram independently with `probability`, reproducibly
    pub fn random_loss(mut self, probability: f64, seed: u64) -> Self {
        self.loss_probability = probability.clamp(0.0, 1.0);
        self.seed = seed;
        self
    }

    /// Drop everything
    pub fn drop_all(mut self) -> Self {
        self.drop_all = true;
        self
    }
}

/// What the link did with a datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fate {
    Delivered,
    Dropped,
    Duplicated,
    Corrupted,
    Reordered,
}

/// One datagram as handed to the simulated link
#[derive(Debug, Clone)]
pub struct CapturedDatagram {
    /// 1-based index within its direction
    pub index: u64,
    pub from: SocketAddr,
    pub to: SocketAddr,
    /// When the sender handed it to the link
    pub at: Instant,
    /// The packet as sent (before any corruption), if it decodes
    pub packet: Option<Packet>,
    pub fate: Fate,
}

impl CapturedDatagram {
    pub fn kind(&self) -> Option<PacketKind> {
        self.packet.as_ref().map(Packet::kind)
    }

    pub fn seq(&self) -> Option<SeqNumber> {
        self.packet.as_ref().map(Packet::seq)
    }
}

/// Shared record of every datagram sent over a simulated pair
#[derive(Debug, Clone, Default)]
pub struct CaptureLog {
    entries: Arc<Mutex<Vec<CapturedDatagram>>>,
}

impl CaptureLog {
    pub fn entries(&self) -> Vec<CapturedDatagram> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Datagrams sent by `from`, in order
    pub fn sent_by(&self, from: SocketAddr) -> Vec<CapturedDatagram> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.from == from)
            .cloned()
            .collect()
    }

    /// Packet kinds of all datagrams, in send order
    pub fn kinds(&self) -> Vec<PacketKind> {
        self.entries
            .lock()
            .iter()
            .filter_map(CapturedDatagram::kind)
            .collect()
    }

    /// Every transmission of data packet `seq` by `from`
    pub fn data_transmissions(&self, from: SocketAddr, seq: SeqNumber) -> Vec<CapturedDatagram> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| {
                entry.from == from
                    && entry.kind() == Some(PacketKind::Data)
                    && entry.seq() == Some(seq)
            })
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn record(&self, entry: CapturedDatagram) {
        self.entries.lock().push(entry);
    }
}

struct Envelope {
    from: SocketAddr,
    bytes: Vec<u8>,
}

struct LinkState {
    sent: u64,
    seen_data: HashSet<u32>,
    rng: StdRng,
    held: Option<Vec<u8>>,
}

/// One endpoint of a simulated link
pub struct SimTransport {
    local: SocketAddr,
    peer: SocketAddr,
    plan: FaultPlan,
    state: Mutex<LinkState>,
    outgoing: Sender<Envelope>,
    incoming: Receiver<Envelope>,
    /// Sender side of our own inbox, for injected datagrams
    inbox: Sender<Envelope>,
    capture: CaptureLog,
}

impl SimTransport {
    /// Two endpoints joined by a perfect link
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (SimTransport, SimTransport) {
        Self::pair_with_faults(a, FaultPlan::new(), b, FaultPlan::new())
    }

    /// Two endpoints; `a_to_b` applies to datagrams sent by `a`
    pub fn pair_with_faults(
        a: SocketAddr,
        a_to_b: FaultPlan,
        b: SocketAddr,
        b_to_a: FaultPlan,
    ) -> (SimTransport, SimTransport) {
        let (to_a, a_inbox) = channel::unbounded();
        let (to_b, b_inbox) = channel::unbounded();
        let capture = CaptureLog::default();

        let end_a = SimTransport::new(
            a,
            b,
            a_to_b,
            to_b.clone(),
            a_inbox,
            to_a.clone(),
            capture.clone(),
        );
        let end_b = SimTransport::new(b, a, b_to_a, to_a, b_inbox, to_b, capture);
        (end_a, end_b)
    }

    fn new(
        local: SocketAddr,
        peer: SocketAddr,
        plan: FaultPlan,
        outgoing: Sender<Envelope>,
        incoming: Receiver<Envelope>,
        inbox: Sender<Envelope>,
        capture: CaptureLog,
    ) -> Self {
        let rng = StdRng::seed_from_u64(plan.seed);
        SimTransport {
            local,
            peer,
            plan,
            state: Mutex::new(LinkState {
                sent: 0,
                seen_data: HashSet::new(),
                rng,
                held: None,
            }),
            outgoing,
            incoming,
            inbox,
            capture,
        }
    }

    /// Log shared by both ends of the pair
    pub fn capture(&self) -> CaptureLog {
        self.capture.clone()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Make `bytes` arrive at this endpoint as if sent by `from`
    ///
    /// Bypasses the fault plan and the capture log.
    pub fn inject(&self, bytes: &[u8], from: SocketAddr) {
        let _ = self.inbox.send(Envelope {
            from,
            bytes: bytes.to_vec(),
        });
    }

    fn deliver(&self, bytes: Vec<u8>) {
        // A dropped receiver behaves like a closed UDP port.
        let _ = self.outgoing.send(Envelope {
            from: self.local,
            bytes,
        });
    }
}

impl DatagramTransport for SimTransport {
    fn send_to(&self, datagram: &[u8], target: SocketAddr) -> io::Result<()> {
        if target != self.peer {
            tracing::trace!("Simulated link has no endpoint at {}", target);
            return Ok(());
        }

        let mut state = self.state.lock();
        state.sent += 1;
        let index = state.sent;
        let packet = Packet::from_bytes(datagram).ok();

        let first_data_drop = match &packet {
            Some(p) if p.kind() == PacketKind::Data => {
                let raw = p.seq().as_raw();
                state.seen_data.insert(raw) && self.plan.drop_first_data.contains(&raw)
            }
            _ => false,
        };
        let random_drop =
            self.plan.loss_probability > 0.0 && state.rng.gen_bool(self.plan.loss_probability);

        let fate = if self.plan.drop_all
            || self.plan.drop_nth.contains(&index)
            || first_data_drop
            || random_drop
        {
            Fate::Dropped
        } else if self.plan.corrupt_nth.contains(&index) {
            Fate::Corrupted
        } else if self.plan.duplicate_nth.contains(&index) {
            Fate::Duplicated
        } else if self.plan.hold_nth.contains(&index) {
            Fate::Reordered
        } else {
            Fate::Delivered
        };

        tracing::trace!("Sim {} -> {} #{}: {:?}", self.local, self.peer, index, fate);
        self.capture.record(CapturedDatagram {
            index,
            from: self.local,
            to: target,
            at: Instant::now(),
            packet,
            fate,
        });

        match fate {
            Fate::Dropped => return Ok(()),
            Fate::Reordered => {
                if let Some(previous) = state.held.replace(datagram.to_vec()) {
                    self.deliver(previous);
                }
                return Ok(());
            }
            Fate::Corrupted => {
                let mut damaged = datagram.to_vec();
                if let Some(first) = damaged.first_mut() {
                    *first ^= 0x01;
                }
                self.deliver(damaged);
            }
            Fate::Duplicated => {
                self.deliver(datagram.to_vec());
                self.deliver(datagram.to_vec());
            }
            Fate::Delivered => self.deliver(datagram.to_vec()),
        }

        if let Some(held) = state.held.take() {
            self.deliver(held);
        }
        Ok(())
    }

    fn recv_from(
        &self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.incoming.recv_timeout(timeout) {
            Ok(envelope) => {
                // Oversized datagrams are truncated like UDP does.
                let n = envelope.bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&envelope.bytes[..n]);
                Ok(Some((n, envelope.from)))
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }
}
