//! Send window: outbound queue plus in-flight retransmission set
//!
//! Payloads are assigned consecutive sequence numbers when pushed, wait in an
//! outbound queue, and move to the in-flight set when transmitted. At most
//! `window_size` packets are in flight. Every in-flight packet carries its
//! own retransmission timer; acknowledgments are cumulative.
//!
//! ```text
//!  send_base          next_unsent         next_seq
//!      │                   │                  │
//!  ────┼───────────────────┼──────────────────┼──────▶ seq space
//!      │ <── in flight ──> │ <──  queued  ──> │
//! ```
//!
//! No I/O happens here; the connection encodes and emits the returned
//! [`Transmission`]s.

use crate::config::{ConfigError, ConnectionConfig};
use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Send window errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("Delivery failed: packet {seq} unacknowledged after {attempts} transmissions")]
    DeliveryFailed { seq: SeqNumber, attempts: u32 },
}

/// Payload waiting for window space
#[derive(Debug, Clone)]
struct QueuedPacket {
    seq: SeqNumber,
    payload: Bytes,
}

/// Transmitted, unacknowledged packet
#[derive(Debug, Clone)]
struct InFlightPacket {
    seq: SeqNumber,
    payload: Bytes,
    /// Time of the first transmission (for RTT samples)
    first_sent: Instant,
    /// Time of the most recent transmission (for the retransmission timer)
    last_sent: Instant,
    /// Number of times this packet has been put on the wire
    send_count: u32,
}

/// A packet the caller must put on the wire now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    pub seq: SeqNumber,
    pub payload: Bytes,
    /// 1 for the first transmission, 2 for the first retransmission, ...
    pub attempt: u32,
}

impl Transmission {
    pub fn is_retransmission(&self) -> bool {
        self.attempt > 1
    }
}

/// Result of applying a cumulative acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// `count` packets left the in-flight set
    Acknowledged {
        count: usize,
        /// Round-trip sample, only taken from packets sent exactly once
        rtt: Option<Duration>,
    },
    /// Nothing below the ack number was in flight
    Duplicate,
    /// The ack covers sequence numbers that were never transmitted
    OutOfRange,
}

/// Sliding send window for one connection
#[derive(Debug)]
pub struct SendWindow {
    queue: VecDeque<QueuedPacket>,
    in_flight: VecDeque<InFlightPacket>,
    /// Sequence number for the next pushed payload
    next_seq: SeqNumber,
    window_size: usize,
    retransmit_timeout: Duration,
    max_retries: u32,
}

impl SendWindow {
    /// Create a window starting at sequence number 0
    ///
    /// # Errors
    /// `ConfigError::ZeroWindow` if `window_size` is 0.
    pub fn new(
        window_size: usize,
        retransmit_timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(SendWindow {
            queue: VecDeque::new(),
            in_flight: VecDeque::with_capacity(window_size),
            next_seq: SeqNumber::ZERO,
            window_size,
            retransmit_timeout,
            max_retries,
        })
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.window_size,
            config.retransmit_timeout,
            config.max_retries,
        )
    }

    /// Queue a payload and assign it the next sequence number
    pub fn push(&mut self, payload: Bytes) -> SeqNumber {
        let seq = self.next_seq;
        self.queue.push_back(QueuedPacket { seq, payload });
        self.next_seq.increment();
        seq
    }

    /// Move queued packets into flight while the window has room
    pub fn transmit_ready(&mut self, now: Instant) -> Vec<Transmission> {
        let mut out = Vec::new();

        while self.in_flight.len() < self.window_size {
            let Some(queued) = self.queue.pop_front() else {
                break;
            };
            out.push(Transmission {
                seq: queued.seq,
                payload: queued.payload.clone(),
                attempt: 1,
            });
            self.in_flight.push_back(InFlightPacket {
                seq: queued.seq,
                payload: queued.payload,
                first_sent: now,
                last_sent: now,
                send_count: 1,
            });
        }

        out
    }

    /// Collect every in-flight packet whose own timer has expired
    ///
    /// Each returned packet has its send time refreshed to `now`. Fails once
    /// an expired packet has already used up its retransmission budget.
    pub fn due_retransmissions(&mut self, now: Instant) -> Result<Vec<Transmission>, WindowError> {
        let mut out = Vec::new();

        for entry in self.in_flight.iter_mut() {
            if now.saturating_duration_since(entry.last_sent) < self.retransmit_timeout {
                continue;
            }
            if entry.send_count > self.max_retries {
                return Err(WindowError::DeliveryFailed {
                    seq: entry.seq,
                    attempts: entry.send_count,
                });
            }
            entry.last_sent = now;
            entry.send_count += 1;
            out.push(Transmission {
                seq: entry.seq,
                payload: entry.payload.clone(),
                attempt: entry.send_count,
            });
        }

        Ok(out)
    }

    /// Apply a cumulative acknowledgment: `ack` is the next sequence number
    /// the peer expects, so every in-flight packet below it is delivered
    pub fn on_ack(&mut self, ack: SeqNumber, now: Instant) -> AckOutcome {
        if ack.gt(self.next_unsent()) {
            return AckOutcome::OutOfRange;
        }

        let mut count = 0;
        let mut rtt = None;
        while let Some(front) = self.in_flight.front() {
            if !front.seq.lt(ack) {
                break;
            }
            if front.send_count == 1 {
                rtt = Some(now.saturating_duration_since(front.first_sent));
            }
            self.in_flight.pop_front();
            count += 1;
        }

        if count == 0 {
            AckOutcome::Duplicate
        } else {
            AckOutcome::Acknowledged { count, rtt }
        }
    }

    /// Earliest instant at which an in-flight packet becomes due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.in_flight
            .iter()
            .map(|entry| entry.last_sent + self.retransmit_timeout)
            .min()
    }

    /// Oldest sequence number not yet acknowledged
    pub fn send_base(&self) -> SeqNumber {
        self.in_flight
            .front()
            .map(|entry| entry.seq)
            .unwrap_or_else(|| self.next_unsent())
    }

    /// Sequence number of the next packet to be transmitted for the first time
    pub fn next_unsent(&self) -> SeqNumber {
        self.queue
            .front()
            .map(|queued| queued.seq)
            .unwrap_or(self.next_seq)
    }

    /// Whether the packet carrying `seq` has been acknowledged
    pub fn is_acknowledged(&self, seq: SeqNumber) -> bool {
        seq.lt(self.send_base())
    }

    /// Sequence number the next pushed payload will get
    pub fn next_seq(&self) -> SeqNumber {
        self.next_seq
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Nothing queued and nothing awaiting acknowledgment
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty() && self.queue.is_empty()
    }

    /// Sequence numbers currently in flight, oldest first
    pub fn in_flight_seqs(&self) -> impl Iterator<Item = SeqNumber> + '_ {
        self.in_flight.iter().map(|entry| entry.seq)
    }

    /// Drop all queued and in-flight packets and restart at sequence 0
    pub fn reset(&mut self) {
        self.queue.clear();
        self.in_flight.clear();
        self.next_seq = SeqNumber::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RTO: Duration = Duration::from_millis(100);

    fn window(size: usize) -> SendWindow {
        SendWindow::new(size, RTO, 3).unwrap()
    }

    fn push_n(w: &mut SendWindow, n: usize) -> Vec<SeqNumber> {
        (0..n)
            .map(|i| w.push(Bytes::from(format!("payload {}", i))))
            .collect()
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            SendWindow::new(0, RTO, 3),
            Err(ConfigError::ZeroWindow)
        ));
        let config = ConnectionConfig::default().with_window_size(0);
        assert!(matches!(
            SendWindow::from_config(&config),
            Err(ConfigError::ZeroWindow)
        ));
    }

    #[test]
    fn test_push_assigns_consecutive_seqs() {
        let mut w = window(4);
        let seqs = push_n(&mut w, 5);
        let raw: Vec<u32> = seqs.iter().map(|s| s.as_raw()).collect();
        assert_eq!(raw, vec![0, 1, 2, 3, 4]);
        assert_eq!(w.next_seq(), SeqNumber::new(5));
        assert_eq!(w.queued(), 5);
        assert_eq!(w.in_flight(), 0);
    }

    #[test]
    fn test_transmit_respects_window() {
        let now = Instant::now();
        let mut w = window(3);
        push_n(&mut w, 5);

        let sent = w.transmit_ready(now);
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|t| t.attempt == 1));
        assert_eq!(w.in_flight(), 3);
        assert_eq!(w.queued(), 2);

        // Window full: nothing more goes out.
        assert!(w.transmit_ready(now).is_empty());
    }

    #[test]
    fn test_cumulative_ack() {
        let now = Instant::now();
        let mut w = window(4);
        push_n(&mut w, 4);
        w.transmit_ready(now);

        let outcome = w.on_ack(SeqNumber::new(2), now + Duration::from_millis(5));
        assert_eq!(
            outcome,
            AckOutcome::Acknowledged {
                count: 2,
                rtt: Some(Duration::from_millis(5))
            }
        );
        let remaining: Vec<u32> = w.in_flight_seqs().map(|s| s.as_raw()).collect();
        assert_eq!(remaining, vec![2, 3]);
        assert!(w.is_acknowledged(SeqNumber::new(1)));
        assert!(!w.is_acknowledged(SeqNumber::new(2)));
    }

    #[test]
    fn test_ack_opens_window() {
        let now = Instant::now();
        let mut w = window(2);
        push_n(&mut w, 3);
        assert_eq!(w.transmit_ready(now).len(), 2);

        w.on_ack(SeqNumber::new(1), now);
        let sent = w.transmit_ready(now);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].seq, SeqNumber::new(2));
    }

    #[test]
    fn test_duplicate_ack_ignored() {
        let now = Instant::now();
        let mut w = window(4);
        push_n(&mut w, 2);
        w.transmit_ready(now);

        assert!(matches!(
            w.on_ack(SeqNumber::new(1), now),
            AckOutcome::Acknowledged { count: 1, .. }
        ));
        assert_eq!(w.on_ack(SeqNumber::new(1), now), AckOutcome::Duplicate);
        assert_eq!(w.on_ack(SeqNumber::ZERO, now), AckOutcome::Duplicate);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn test_ack_beyond_transmitted_is_out_of_range() {
        let now = Instant::now();
        let mut w = window(1);
        push_n(&mut w, 3);
        w.transmit_ready(now);

        // Only seq 0 is on the wire; an ack of 2 would cover seq 1.
        assert_eq!(w.on_ack(SeqNumber::new(2), now), AckOutcome::OutOfRange);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn test_retransmission_per_packet() {
        let start = Instant::now();
        let mut w = window(4);

        w.push(Bytes::from_static(b"a"));
        w.transmit_ready(start);
        w.push(Bytes::from_static(b"b"));
        w.transmit_ready(start + Duration::from_millis(60));

        // Only the first packet's timer has expired.
        let due = w.due_retransmissions(start + RTO).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].seq, SeqNumber::ZERO);
        assert_eq!(due[0].attempt, 2);
        assert!(due[0].is_retransmission());

        let due = w
            .due_retransmissions(start + Duration::from_millis(160))
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].seq, SeqNumber::new(1));
    }

    #[test]
    fn test_not_due_before_timeout() {
        let start = Instant::now();
        let mut w = window(4);
        push_n(&mut w, 1);
        w.transmit_ready(start);

        assert!(w
            .due_retransmissions(start + RTO - Duration::from_millis(1))
            .unwrap()
            .is_empty());
        assert_eq!(w.next_deadline(), Some(start + RTO));
    }

    #[test]
    fn test_delivery_failed_after_budget() {
        let start = Instant::now();
        let mut w = SendWindow::new(4, RTO, 2).unwrap();
        push_n(&mut w, 1);
        w.transmit_ready(start);

        assert_eq!(w.due_retransmissions(start + RTO).unwrap().len(), 1);
        assert_eq!(w.due_retransmissions(start + RTO * 2).unwrap().len(), 1);
        assert_eq!(
            w.due_retransmissions(start + RTO * 3),
            Err(WindowError::DeliveryFailed {
                seq: SeqNumber::ZERO,
                attempts: 3
            })
        );
    }

    #[test]
    fn test_retransmitted_packet_gives_no_rtt_sample() {
        let start = Instant::now();
        let mut w = window(4);
        push_n(&mut w, 1);
        w.transmit_ready(start);
        w.due_retransmissions(start + RTO).unwrap();

        assert_eq!(
            w.on_ack(SeqNumber::new(1), start + RTO * 2),
            AckOutcome::Acknowledged { count: 1, rtt: None }
        );
        assert!(w.is_idle());
        assert_eq!(w.next_deadline(), None);
    }

    #[test]
    fn test_reset() {
        let now = Instant::now();
        let mut w = window(2);
        push_n(&mut w, 3);
        w.transmit_ready(now);
        w.reset();

        assert!(w.is_idle());
        assert_eq!(w.next_seq(), SeqNumber::ZERO);
    }
}
