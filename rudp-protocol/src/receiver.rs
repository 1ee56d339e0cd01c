//! In-order receive state
//!
//! The receiver only ever accepts the next expected sequence number. Anything
//! else (an old duplicate or a packet from beyond a gap) is discarded, and the
//! connection answers with a duplicate acknowledgment carrying the unchanged
//! expected number so the sender retransmits from there.

use crate::sequence::SeqNumber;

/// What to do with an incoming data packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Next in order: deliver the payload to the application
    Deliver,
    /// Already delivered
    Duplicate,
    /// Arrived ahead of a gap
    OutOfOrder,
}

impl ReceiveOutcome {
    pub fn is_deliver(self) -> bool {
        matches!(self, ReceiveOutcome::Deliver)
    }
}

/// Receive-side sequencing for one connection
#[derive(Debug, Clone, Default)]
pub struct ReceiveState {
    /// Next sequence number to deliver
    expected: SeqNumber,
    delivered: u64,
    discarded: u64,
}

impl ReceiveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a data packet, advancing the expected number on delivery
    pub fn on_data(&mut self, seq: SeqNumber) -> ReceiveOutcome {
        if seq == self.expected {
            self.expected.increment();
            self.delivered += 1;
            return ReceiveOutcome::Deliver;
        }

        self.discarded += 1;
        if seq.lt(self.expected) {
            ReceiveOutcome::Duplicate
        } else {
            ReceiveOutcome::OutOfOrder
        }
    }

    /// Cumulative acknowledgment number to advertise
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        self.expected
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_delivery() {
        let mut rx = ReceiveState::new();
        for i in 0..5 {
            assert_eq!(rx.on_data(SeqNumber::new(i)), ReceiveOutcome::Deliver);
        }
        assert_eq!(rx.ack_number(), SeqNumber::new(5));
        assert_eq!(rx.delivered(), 5);
    }

    #[test]
    fn test_duplicate_not_delivered() {
        let mut rx = ReceiveState::new();
        rx.on_data(SeqNumber::new(0));
        rx.on_data(SeqNumber::new(1));

        assert_eq!(rx.on_data(SeqNumber::new(0)), ReceiveOutcome::Duplicate);
        assert_eq!(rx.on_data(SeqNumber::new(1)), ReceiveOutcome::Duplicate);
        assert_eq!(rx.ack_number(), SeqNumber::new(2));
        assert_eq!(rx.discarded(), 2);
    }

    #[test]
    fn test_gap_discards_later_packets() {
        let mut rx = ReceiveState::new();
        rx.on_data(SeqNumber::new(0));

        // seq 1 lost
        assert_eq!(rx.on_data(SeqNumber::new(2)), ReceiveOutcome::OutOfOrder);
        assert_eq!(rx.on_data(SeqNumber::new(3)), ReceiveOutcome::OutOfOrder);
        assert_eq!(rx.ack_number(), SeqNumber::new(1));

        assert!(rx.on_data(SeqNumber::new(1)).is_deliver());
        // 2 must be retransmitted; it was not buffered
        assert!(rx.on_data(SeqNumber::new(2)).is_deliver());
        assert_eq!(rx.ack_number(), SeqNumber::new(3));
    }

    #[test]
    fn test_reset() {
        let mut rx = ReceiveState::new();
        rx.on_data(SeqNumber::new(0));
        rx.reset();
        assert_eq!(rx.ack_number(), SeqNumber::ZERO);
        assert_eq!(rx.delivered(), 0);
    }
}
