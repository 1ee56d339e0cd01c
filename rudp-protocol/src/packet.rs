//! RUDP Packet Structures and Serialization
//!
//! Every datagram is a fixed 18-byte header followed by an opaque payload.
//! Control packets (handshake, acknowledgment) carry an empty payload.
//!
//! # Wire format
//!
//! All multi-byte fields are big-endian.
//!
//! ```text
//! offset 0  : seq            (4 bytes, unsigned)
//! offset 4  : ack            (4 bytes, unsigned)
//! offset 8  : checksum       (1 byte)  = XOR of bytes [0..8)
//! offset 9  : flags          (1 byte)  bit0=ACK bit1=SYN bit2=FIN
//! offset 10 : send_timestamp (8 bytes, IEEE-754 double, seconds since epoch)
//! offset 18+: payload        (variable length)
//! ```
//!
//! # Checksum
//!
//! The checksum is the XOR of the eight `seq‖ack` bytes. It only covers the
//! sequencing fields, and it only catches corruption that flips an odd number
//! of bits in some bit position across those bytes. It is a cheap sanity
//! check against damaged datagrams, not an integrity or security control.

use crate::sequence::SeqNumber;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use std::ops::BitOr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Size of the RUDP packet header in bytes
pub const HEADER_SIZE: usize = 18;

/// Default maximum datagram size (MTU 1500 - 28 bytes of IP+UDP headers)
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 1472;

/// Maximum payload carried by a default-sized datagram
pub const MAX_PAYLOAD_SIZE: usize = DEFAULT_MAX_DATAGRAM_SIZE - HEADER_SIZE;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_CHECKSUM: usize = 8;

/// Header flag bits
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(u8);

impl PacketFlags {
    /// No flags: a data packet
    pub const NONE: PacketFlags = PacketFlags(0);
    /// Acknowledgment number is meaningful
    pub const ACK: PacketFlags = PacketFlags(0b0000_0001);
    /// Synchronise (handshake)
    pub const SYN: PacketFlags = PacketFlags(0b0000_0010);
    /// Finish (reserved, no teardown semantics)
    pub const FIN: PacketFlags = PacketFlags(0b0000_0100);

    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        PacketFlags(bits)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: PacketFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PacketFlags {
    type Output = PacketFlags;

    fn bitor(self, rhs: PacketFlags) -> PacketFlags {
        PacketFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(PacketFlags::SYN) {
            names.push("SYN");
        }
        if self.contains(PacketFlags::ACK) {
            names.push("ACK");
        }
        if self.contains(PacketFlags::FIN) {
            names.push("FIN");
        }
        if names.is_empty() {
            write!(f, "PacketFlags(-)")
        } else {
            write!(f, "PacketFlags({})", names.join("|"))
        }
    }
}

/// What a packet means to the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Handshake initiation
    Syn,
    /// Handshake response
    SynAck,
    /// Pure cumulative acknowledgment
    Ack,
    /// Payload-carrying packet
    Data,
    /// Teardown request (reserved)
    Fin,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Syn => write!(f, "SYN"),
            PacketKind::SynAck => write!(f, "SYN-ACK"),
            PacketKind::Ack => write!(f, "ACK"),
            PacketKind::Data => write!(f, "DATA"),
            PacketKind::Fin => write!(f, "FIN"),
        }
    }
}

/// Compute the header checksum over `seq‖ack`
pub fn checksum(seq: SeqNumber, ack: SeqNumber) -> u8 {
    seq.as_raw()
        .to_be_bytes()
        .iter()
        .chain(ack.as_raw().to_be_bytes().iter())
        .fold(0u8, |acc, byte| acc ^ byte)
}

/// Current wall-clock time as seconds since the Unix epoch
///
/// Used for the `send_timestamp` header field. Retransmission timing inside
/// the connection uses monotonic instants, never this value.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Fixed 18-byte packet header
#[derive(Debug, Clone, PartialEq)]
pub struct PacketHeader {
    /// Sender-assigned sequence number
    pub seq: SeqNumber,
    /// Next sequence number the sender of this packet expects
    pub ack: SeqNumber,
    /// XOR of the `seq‖ack` bytes
    pub checksum: u8,
    /// Flag bits
    pub flags: PacketFlags,
    /// Seconds since the Unix epoch at transmission
    pub send_time: f64,
}

impl PacketHeader {
    /// Create a header with a freshly computed checksum
    pub fn new(seq: SeqNumber, ack: SeqNumber, flags: PacketFlags, send_time: f64) -> Self {
        PacketHeader {
            seq,
            ack,
            checksum: checksum(seq, ack),
            flags,
            send_time,
        }
    }

    /// Check the embedded checksum against the header fields
    #[inline]
    pub fn verify(&self) -> bool {
        self.checksum == checksum(self.seq, self.ack)
    }

    /// Parse header from bytes (network byte order)
    ///
    /// The checksum is parsed but not verified; see [`Packet::from_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CorruptHeader> {
        if bytes.len() < HEADER_SIZE {
            return Err(CorruptHeader::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HEADER_SIZE];
        Ok(PacketHeader {
            seq: SeqNumber::new(buf.get_u32()),
            ack: SeqNumber::new(buf.get_u32()),
            checksum: buf.get_u8(),
            flags: PacketFlags::from_bits(buf.get_u8()),
            send_time: buf.get_f64(),
        })
    }

    /// Serialize header to bytes (network byte order)
    pub fn to_bytes(&self, buf: &mut BytesMut) {
        buf.put_u32(self.seq.as_raw());
        buf.put_u32(self.ack.as_raw());
        buf.put_u8(self.checksum);
        buf.put_u8(self.flags.bits());
        buf.put_f64(self.send_time);
    }
}

/// A complete datagram: header + payload
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    /// Create a packet, computing its checksum
    pub fn new(
        seq: SeqNumber,
        ack: SeqNumber,
        flags: PacketFlags,
        send_time: f64,
        payload: Bytes,
    ) -> Self {
        Packet {
            header: PacketHeader::new(seq, ack, flags, send_time),
            payload,
        }
    }

    /// Handshake initiation
    pub fn syn(seq: SeqNumber, ack: SeqNumber, send_time: f64) -> Self {
        Self::new(seq, ack, PacketFlags::SYN, send_time, Bytes::new())
    }

    /// Handshake response
    pub fn syn_ack(seq: SeqNumber, ack: SeqNumber, send_time: f64) -> Self {
        Self::new(
            seq,
            ack,
            PacketFlags::SYN | PacketFlags::ACK,
            send_time,
            Bytes::new(),
        )
    }

    /// Pure cumulative acknowledgment
    pub fn ack(seq: SeqNumber, ack: SeqNumber, send_time: f64) -> Self {
        Self::new(seq, ack, PacketFlags::ACK, send_time, Bytes::new())
    }

    /// Payload-carrying packet
    pub fn data(seq: SeqNumber, ack: SeqNumber, send_time: f64, payload: Bytes) -> Self {
        Self::new(seq, ack, PacketFlags::NONE, send_time, payload)
    }

    #[inline]
    pub fn seq(&self) -> SeqNumber {
        self.header.seq
    }

    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        self.header.ack
    }

    /// Classify the packet by its flags
    pub fn kind(&self) -> PacketKind {
        let flags = self.header.flags;
        if flags.contains(PacketFlags::SYN) {
            if flags.contains(PacketFlags::ACK) {
                PacketKind::SynAck
            } else {
                PacketKind::Syn
            }
        } else if flags.contains(PacketFlags::FIN) {
            PacketKind::Fin
        } else if flags.contains(PacketFlags::ACK) {
            PacketKind::Ack
        } else {
            PacketKind::Data
        }
    }

    /// Total size of the packet (header + payload)
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        self.header.to_bytes(&mut buf);
        buf.put_slice(&self.payload);
        buf
    }

    /// Parse and validate a packet
    ///
    /// Fails with [`CorruptHeader`] when the buffer is shorter than the
    /// header or the embedded checksum does not match `seq‖ack`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CorruptHeader> {
        let header = PacketHeader::from_bytes(bytes)?;

        if !header.verify() {
            return Err(CorruptHeader::ChecksumMismatch {
                computed: checksum(header.seq, header.ack),
                received: header.checksum,
            });
        }

        let payload = if bytes.len() > HEADER_SIZE {
            Bytes::copy_from_slice(&bytes[HEADER_SIZE..])
        } else {
            Bytes::new()
        };

        Ok(Packet { header, payload })
    }
}

/// Encode a packet in one call
pub fn encode(
    seq: SeqNumber,
    ack: SeqNumber,
    flags: PacketFlags,
    send_time: f64,
    payload: &[u8],
) -> BytesMut {
    Packet::new(seq, ack, flags, send_time, Bytes::copy_from_slice(payload)).to_bytes()
}

/// Decode and validate a packet in one call
pub fn decode(bytes: &[u8]) -> Result<Packet, CorruptHeader> {
    Packet::from_bytes(bytes)
}

/// Check whether raw bytes carry a valid header
pub fn verify(bytes: &[u8]) -> bool {
    bytes.len() >= HEADER_SIZE
        && bytes[OFF_CHECKSUM]
            == bytes[OFF_SEQ..OFF_ACK + 4]
                .iter()
                .fold(0u8, |acc, byte| acc ^ byte)
}

/// Datagram rejected by the codec
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptHeader {
    #[error("Corrupt header: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Corrupt header: checksum {received:#04x} does not match computed {computed:#04x}")]
    ChecksumMismatch { computed: u8, received: u8 },
}
