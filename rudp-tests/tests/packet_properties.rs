//! Property-based tests for the RUDP codec and send window
//!
//! These tests use proptest to check the checksum, sequencing and
//! cumulative-acknowledgment rules over arbitrary inputs.

use bytes::Bytes;
use proptest::prelude::*;
use rudp_protocol::packet::{self, Packet, PacketFlags, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use rudp_protocol::{AckOutcome, ReceiveOutcome, ReceiveState, SendWindow, SeqNumber};
use std::time::{Duration, Instant};

fn seq_strategy() -> impl Strategy<Value = SeqNumber> {
    any::<u32>().prop_map(SeqNumber::new)
}

fn flags_strategy() -> impl Strategy<Value = PacketFlags> {
    prop_oneof![
        Just(PacketFlags::NONE),
        Just(PacketFlags::ACK),
        Just(PacketFlags::SYN),
        Just(PacketFlags::SYN | PacketFlags::ACK),
        Just(PacketFlags::FIN),
    ]
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE)
}

proptest! {
    #[test]
    fn prop_encoded_packets_verify(
        seq in seq_strategy(),
        ack in seq_strategy(),
        flags in flags_strategy(),
        send_time in 0.0f64..4_000_000_000.0,
        payload in payload_strategy(),
    ) {
        let bytes = packet::encode(seq, ack, flags, send_time, &payload);

        prop_assert_eq!(bytes.len(), HEADER_SIZE + payload.len());
        prop_assert!(packet::verify(&bytes));

        let decoded = packet::decode(&bytes).unwrap();
        prop_assert_eq!(decoded.seq(), seq);
        prop_assert_eq!(decoded.ack_number(), ack);
        prop_assert_eq!(decoded.header.flags, flags);
        prop_assert_eq!(decoded.header.send_time, send_time);
        prop_assert_eq!(&decoded.payload[..], &payload[..]);
    }

    #[test]
    fn prop_single_bit_flip_in_sequencing_detected(
        seq in seq_strategy(),
        ack in seq_strategy(),
        bit in 0usize..72,
    ) {
        // bytes 0..8 are seq‖ack, byte 8 is the checksum itself
        let mut bytes = Packet::ack(seq, ack, 0.0).to_bytes();
        bytes[bit / 8] ^= 1 << (bit % 8);

        prop_assert!(!packet::verify(&bytes));
        prop_assert!(packet::decode(&bytes).is_err());
    }

    #[test]
    fn prop_odd_flips_in_one_bit_column_detected(
        seq in seq_strategy(),
        ack in seq_strategy(),
        column in 0u8..8,
        rows in prop::sample::subsequence((0usize..8).collect::<Vec<_>>(), 1..=8)
            .prop_filter("odd number of flips", |rows| rows.len() % 2 == 1),
    ) {
        let mut bytes = Packet::ack(seq, ack, 0.0).to_bytes();
        for row in rows {
            bytes[row] ^= 1 << column;
        }

        prop_assert!(!packet::verify(&bytes));
    }

    #[test]
    fn prop_short_datagrams_rejected(len in 0usize..HEADER_SIZE, fill in any::<u8>()) {
        let bytes = vec![fill; len];
        prop_assert!(!packet::verify(&bytes));
        prop_assert!(packet::decode(&bytes).is_err());
    }

    #[test]
    fn prop_sequence_numbers_consecutive(count in 1usize..200) {
        let mut window = SendWindow::new(8, Duration::from_secs(1), 5).unwrap();

        let seqs: Vec<SeqNumber> = (0..count)
            .map(|_| window.push(Bytes::from_static(b"x")))
            .collect();

        for (i, seq) in seqs.iter().enumerate() {
            prop_assert_eq!(seq.as_raw(), i as u32);
        }
        prop_assert_eq!(window.next_seq().as_raw(), count as u32);
    }

    #[test]
    fn prop_in_flight_never_exceeds_window(
        window_size in 1usize..32,
        pushes in prop::collection::vec(1usize..20, 1..20),
    ) {
        let mut window = SendWindow::new(window_size, Duration::from_secs(1), 5).unwrap();
        let now = Instant::now();

        for batch in pushes {
            for _ in 0..batch {
                window.push(Bytes::from_static(b"x"));
            }
            window.transmit_ready(now);
            prop_assert!(window.in_flight() <= window_size);

            // Acknowledge half of what is in flight
            let retire = window.in_flight() / 2;
            let ack = window.send_base() + retire as u32;
            window.on_ack(ack, now);
            prop_assert!(window.in_flight() <= window_size);
        }
    }

    #[test]
    fn prop_cumulative_ack_retires_exactly_below(
        window_size in 1usize..64,
        sent in 1usize..64,
        ack_offset in 0u32..64,
    ) {
        let mut window = SendWindow::new(window_size, Duration::from_secs(1), 5).unwrap();
        let now = Instant::now();
        for _ in 0..sent {
            window.push(Bytes::from_static(b"x"));
        }
        window.transmit_ready(now);

        let in_flight_before: Vec<SeqNumber> = window.in_flight_seqs().collect();
        let next_unsent = window.next_unsent();
        let ack = SeqNumber::new(ack_offset);
        let outcome = window.on_ack(ack, now);
        let remaining: Vec<SeqNumber> = window.in_flight_seqs().collect();

        if ack.gt(next_unsent) {
            prop_assert_eq!(outcome, AckOutcome::OutOfRange);
            prop_assert_eq!(remaining, in_flight_before);
        } else {
            let expected: Vec<SeqNumber> = in_flight_before
                .iter()
                .copied()
                .filter(|seq| seq.ge(ack))
                .collect();
            prop_assert_eq!(&remaining, &expected);
            prop_assert!(remaining.iter().all(|seq| seq.ge(ack)));
            if ack_offset == 0 {
                prop_assert_eq!(outcome, AckOutcome::Duplicate);
            }
        }
    }

    #[test]
    fn prop_receiver_delivers_each_seq_once_in_order(
        arrivals in prop::collection::vec(0u32..16, 0..200),
    ) {
        let mut receiver = ReceiveState::new();
        let mut delivered = Vec::new();

        for raw in arrivals {
            let seq = SeqNumber::new(raw);
            if receiver.on_data(seq) == ReceiveOutcome::Deliver {
                delivered.push(raw);
            }
        }

        let expected: Vec<u32> = (0..delivered.len() as u32).collect();
        prop_assert_eq!(&delivered, &expected);
        prop_assert_eq!(receiver.ack_number().as_raw(), delivered.len() as u32);
    }
}
