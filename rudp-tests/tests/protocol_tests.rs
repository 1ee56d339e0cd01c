//! Integration tests for RUDP packet handling and the sans-I/O connection

use bytes::Bytes;
use rudp_protocol::packet::{
    self, checksum, CorruptHeader, Packet, PacketFlags, PacketKind, HEADER_SIZE, MAX_PAYLOAD_SIZE,
};
use rudp_protocol::{
    AckOutcome, Connection, ConnectionConfig, ConnectionError, ConnectionState, SendWindow,
    SeqNumber, Transmit,
};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[test]
fn test_header_wire_layout() {
    let packet = Packet::data(
        SeqNumber::new(0x0102_0304),
        SeqNumber::new(0x0A0B_0C0D),
        1.5,
        Bytes::from_static(b"xyz"),
    );
    let bytes = packet.to_bytes();

    assert_eq!(bytes.len(), HEADER_SIZE + 3);
    assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&bytes[4..8], &[0x0A, 0x0B, 0x0C, 0x0D]);
    assert_eq!(bytes[8], 0x01 ^ 0x02 ^ 0x03 ^ 0x04 ^ 0x0A ^ 0x0B ^ 0x0C ^ 0x0D);
    assert_eq!(bytes[9], 0);
    assert_eq!(&bytes[10..18], &1.5f64.to_be_bytes());
    assert_eq!(&bytes[18..], b"xyz");
}

#[test]
fn test_flag_bits() {
    let now = 0.0;
    let zero = SeqNumber::ZERO;

    assert_eq!(Packet::ack(zero, zero, now).to_bytes()[9], 0b001);
    assert_eq!(Packet::syn(zero, zero, now).to_bytes()[9], 0b010);
    assert_eq!(Packet::syn_ack(zero, zero, now).to_bytes()[9], 0b011);

    let fin = Packet::new(zero, zero, PacketFlags::FIN, now, Bytes::new());
    assert_eq!(fin.to_bytes()[9], 0b100);
    assert_eq!(fin.kind(), PacketKind::Fin);
}

#[test]
fn test_decode_all_kinds() {
    let seq = SeqNumber::new(7);
    let ack = SeqNumber::new(3);
    let cases = [
        (Packet::syn(seq, ack, 1.0), PacketKind::Syn),
        (Packet::syn_ack(seq, ack, 1.0), PacketKind::SynAck),
        (Packet::ack(seq, ack, 1.0), PacketKind::Ack),
        (
            Packet::data(seq, ack, 1.0, Bytes::from_static(b"payload")),
            PacketKind::Data,
        ),
    ];

    for (packet, kind) in cases {
        let decoded = packet::decode(&packet.to_bytes()).unwrap();
        assert_eq!(decoded.kind(), kind);
        assert_eq!(decoded, packet);
    }
}

#[test]
fn test_encode_matches_packet_builder() {
    let encoded = packet::encode(
        SeqNumber::new(42),
        SeqNumber::new(9),
        PacketFlags::NONE,
        2.25,
        b"abc",
    );
    let built = Packet::data(
        SeqNumber::new(42),
        SeqNumber::new(9),
        2.25,
        Bytes::from_static(b"abc"),
    );
    assert_eq!(encoded, built.to_bytes());
    assert!(packet::verify(&encoded));
}

#[test]
fn test_truncated_datagram_rejected() {
    let bytes = Packet::ack(SeqNumber::new(1), SeqNumber::new(2), 0.0).to_bytes();

    for len in 0..HEADER_SIZE {
        assert_eq!(
            packet::decode(&bytes[..len]),
            Err(CorruptHeader::Truncated {
                expected: HEADER_SIZE,
                actual: len
            })
        );
        assert!(!packet::verify(&bytes[..len]));
    }
}

#[test]
fn test_corrupted_sequencing_rejected() {
    let seq = SeqNumber::new(1000);
    let ack = SeqNumber::new(2000);
    let mut bytes = Packet::ack(seq, ack, 0.0).to_bytes();
    bytes[5] ^= 0x40;

    match packet::decode(&bytes) {
        Err(CorruptHeader::ChecksumMismatch { computed, received }) => {
            assert_eq!(received, checksum(seq, ack));
            assert_ne!(computed, received);
        }
        other => panic!("expected checksum mismatch, got {:?}", other),
    }
}

#[test]
fn test_checksum_does_not_cover_payload_or_timestamp() {
    let mut bytes = Packet::data(
        SeqNumber::new(5),
        SeqNumber::ZERO,
        10.0,
        Bytes::from_static(b"data"),
    )
    .to_bytes();
    bytes[12] ^= 0xFF;
    bytes[HEADER_SIZE] ^= 0xFF;

    assert!(packet::verify(&bytes));
}

#[test]
fn test_max_payload_fits_default_datagram() {
    let config = ConnectionConfig::default();
    assert_eq!(config.max_payload_size(), MAX_PAYLOAD_SIZE);

    let packet = Packet::data(
        SeqNumber::ZERO,
        SeqNumber::ZERO,
        0.0,
        Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE]),
    );
    assert_eq!(packet.to_bytes().len(), config.max_datagram_size);
}

#[test]
fn test_window_retransmission_timeline() {
    let rto = Duration::from_millis(100);
    let mut window = SendWindow::new(2, rto, 1).unwrap();
    let t0 = Instant::now();

    window.push(Bytes::from_static(b"a"));
    window.push(Bytes::from_static(b"b"));
    window.push(Bytes::from_static(b"c"));

    let first = window.transmit_ready(t0);
    assert_eq!(first.len(), 2);
    assert_eq!(window.queued(), 1);

    // Timer fires exactly at the rto boundary.
    assert!(window
        .due_retransmissions(t0 + rto - Duration::from_millis(1))
        .unwrap()
        .is_empty());
    let retx = window.due_retransmissions(t0 + rto).unwrap();
    assert_eq!(retx.len(), 2);
    assert!(retx.iter().all(|t| t.attempt == 2));

    // Retransmitted packets give no RTT sample.
    assert_eq!(
        window.on_ack(SeqNumber::new(1), t0 + rto * 2),
        AckOutcome::Acknowledged { count: 1, rtt: None }
    );

    // Freed slot goes to the queued payload.
    let next = window.transmit_ready(t0 + rto * 2);
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].seq, SeqNumber::new(2));

    // seq 1 has used its single retry.
    let err = window.due_retransmissions(t0 + rto * 3).unwrap_err();
    assert_eq!(
        err,
        rudp_protocol::WindowError::DeliveryFailed {
            seq: SeqNumber::new(1),
            attempts: 2
        }
    );
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 168, 1, 1], port))
}

fn drain(conn: &mut Connection) -> Vec<Transmit> {
    std::iter::from_fn(|| conn.poll_transmit()).collect()
}

/// Shuttle every pending datagram in both directions until both sides go quiet
fn exchange(client: &mut Connection, server: &mut Connection, now: Instant) -> usize {
    let mut moved = 0;
    loop {
        let to_server = drain(client);
        let to_client = drain(server);
        if to_server.is_empty() && to_client.is_empty() {
            return moved;
        }
        moved += to_server.len() + to_client.len();
        for t in &to_server {
            server.handle_datagram(&t.contents, addr(1000), now);
        }
        for t in &to_client {
            client.handle_datagram(&t.contents, addr(2000), now);
        }
    }
}

#[test]
fn test_sans_io_transfer() {
    let config = ConnectionConfig::default().with_window_size(4);
    let mut client = Connection::initiator(addr(2000), config.clone()).unwrap();
    let mut server = Connection::responder(config).unwrap();
    let now = Instant::now();

    client.connect(now).unwrap();
    assert_eq!(exchange(&mut client, &mut server, now), 3);
    assert_eq!(client.state(), ConnectionState::Established);
    assert_eq!(server.state(), ConnectionState::Established);
    assert_eq!(server.peer(), Some(addr(1000)));

    let messages: Vec<Bytes> = (0..10u8).map(|i| Bytes::from(vec![i; 100])).collect();
    for message in &messages {
        client.send(message.clone(), now).unwrap();
    }
    assert_eq!(client.in_flight(), 4);
    assert_eq!(client.queued(), 6);

    exchange(&mut client, &mut server, now);
    assert!(client.is_idle());

    let received: Vec<Bytes> = std::iter::from_fn(|| server.poll_delivered())
        .map(|(payload, from)| {
            assert_eq!(from, addr(1000));
            payload
        })
        .collect();
    assert_eq!(received, messages);
    assert_eq!(server.local_ack(), SeqNumber::new(10));
    assert_eq!(client.stats().packets_acked, 10);
    assert_eq!(client.stats().packets_retransmitted, 0);
}

#[test]
fn test_sans_io_delivery_failure_is_reported_once() {
    let config = ConnectionConfig::default()
        .with_retransmit_timeout(Duration::from_millis(10))
        .with_max_retries(1);
    let mut client = Connection::initiator(addr(2000), config.clone()).unwrap();
    let mut server = Connection::responder(config).unwrap();
    let t0 = Instant::now();

    client.connect(t0).unwrap();
    exchange(&mut client, &mut server, t0);
    client.send(Bytes::from_static(b"lost"), t0).unwrap();
    drain(&mut client);

    let rto = Duration::from_millis(10);
    client.handle_timeout(t0 + rto).unwrap();
    assert_eq!(drain(&mut client).len(), 1);

    let err = client.handle_timeout(t0 + rto * 2).unwrap_err();
    assert!(matches!(
        err,
        ConnectionError::DeliveryFailed { attempts: 2, .. }
    ));
    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(client.handle_timeout(t0 + rto * 3).is_ok());
}
