//! Packet model shared by both endpoints.
//!
//! A [`Packet`] is an immutable value: it is built through one of the
//! kind-specific constructors and never modified afterwards.  Each packet is
//! either a pure control packet (SYN, SYN-ACK, FIN, FIN-ACK, ACK) with no
//! payload, or a data packet with no control flags and a payload.  The
//! constructors are the only way to obtain a packet, so that split holds by
//! construction.
//!
//! Sequence and acknowledgement numbers are single bits ([`SeqBit`]): with at
//! most one packet in flight the sender only has to tell "this one" from
//! "the previous one".
//!
//! # Wire format
//!
//! In-process links pass [`Packet`] values around directly.  Links that cross
//! a real socket use [`Packet::encode`] / [`Packet::decode`]:
//!
//! ```text
//!  0         1       2       3         4         5               7
//! +---------+-------+-------+---------+---------+---------------+
//! |  flags  |  seq  |  ack  | src_len | dst_len |  payload_len  |
//! +---------+-------+-------+---------+---------+---------------+
//! |  src bytes ...  |  dst bytes ...  |  payload bytes ...      |
//! +-----------------+-----------------+-------------------------+
//! ```
//!
//! Bit 7 of `flags` marks a present payload.  `payload_len` is big-endian.
//! There is no checksum: corruption detection is not part of this protocol.

use std::fmt;

use thiserror::Error;

/// Bit-flag constants for the `flags` field.
pub mod flags {
    /// Synchronise: connection setup.
    pub const SYN: u8 = 0b0000_0001;
    /// Acknowledgement.
    pub const ACK: u8 = 0b0000_0010;
    /// Finish: the sender has no more data.
    pub const FIN: u8 = 0b0000_0100;

    /// Wire-only marker for "payload present".  Never stored in a [`super::Packet`].
    pub(crate) const PAYLOAD: u8 = 0b1000_0000;
}

/// Byte length of the fixed part of an encoded packet.
pub const HEADER_LEN: usize = 7;

const OFF_FLAGS: usize = 0;
const OFF_SEQ: usize = 1;
const OFF_ACK: usize = 2;
const OFF_SRC_LEN: usize = 3;
const OFF_DST_LEN: usize = 4;
const OFF_PAYLOAD_LEN: usize = 5;

// ---------------------------------------------------------------------------
// SeqBit
// ---------------------------------------------------------------------------

/// A one-bit sequence or acknowledgement number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SeqBit(u8);

impl SeqBit {
    pub const ZERO: SeqBit = SeqBit(0);
    pub const ONE: SeqBit = SeqBit(1);

    /// Returns `None` for anything other than 0 or 1.
    pub fn new(value: u8) -> Option<Self> {
        match value {
            0 | 1 => Some(SeqBit(value)),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// `(self + 1) mod 2`.
    #[must_use]
    pub fn flip(self) -> Self {
        SeqBit(self.0 ^ 1)
    }

    /// `(self - 1) mod 2`.  Identical to [`flip`](Self::flip) in a 1-bit space.
    #[must_use]
    pub fn prev(self) -> Self {
        self.flip()
    }
}

impl fmt::Display for SeqBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Endpoint identifier, e.g. `"A"` or `"B"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    pub fn new(name: impl Into<String>) -> Self {
        Address(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Address {
    fn from(name: &str) -> Self {
        Address::new(name)
    }
}

impl From<String> for Address {
    fn from(name: String) -> Self {
        Address(name)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// The single meaningful role of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Syn,
    SynAck,
    Fin,
    FinAck,
    Ack,
    Data,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Syn => "SYN",
            PacketKind::SynAck => "SYN-ACK",
            PacketKind::Fin => "FIN",
            PacketKind::FinAck => "FIN-ACK",
            PacketKind::Ack => "ACK",
            PacketKind::Data => "DATA",
        };
        f.write_str(name)
    }
}

/// One protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    src: Address,
    dst: Address,
    seq: SeqBit,
    ack: SeqBit,
    flags: u8,
    payload: Option<Vec<u8>>,
}

impl Packet {
    fn control(src: Address, dst: Address, seq: SeqBit, ack: SeqBit, flags: u8) -> Self {
        Packet {
            src,
            dst,
            seq,
            ack,
            flags,
            payload: None,
        }
    }

    /// Connection request: `seq=0, ack=0, {SYN}`.
    pub fn syn(src: Address, dst: Address) -> Self {
        Self::control(src, dst, SeqBit::ZERO, SeqBit::ZERO, flags::SYN)
    }

    /// Connection accept: `seq=0, ack=0, {SYN, ACK}`.
    pub fn syn_ack(src: Address, dst: Address) -> Self {
        Self::control(src, dst, SeqBit::ZERO, SeqBit::ZERO, flags::SYN | flags::ACK)
    }

    /// Plain acknowledgement carrying `ack`.
    pub fn ack(src: Address, dst: Address, ack: SeqBit) -> Self {
        Self::control(src, dst, SeqBit::ZERO, ack, flags::ACK)
    }

    /// End of stream.  Carries the sender's current sequence number.
    pub fn fin(src: Address, dst: Address, seq: SeqBit) -> Self {
        Self::control(src, dst, seq, SeqBit::ZERO, flags::FIN)
    }

    /// Teardown accept: `{FIN, ACK}`.
    pub fn fin_ack(src: Address, dst: Address) -> Self {
        Self::control(src, dst, SeqBit::ZERO, SeqBit::ZERO, flags::FIN | flags::ACK)
    }

    /// Data segment: no flags, `payload` present.
    pub fn data(src: Address, dst: Address, seq: SeqBit, payload: Vec<u8>) -> Self {
        Packet {
            src,
            dst,
            seq,
            ack: SeqBit::ZERO,
            flags: 0,
            payload: Some(payload),
        }
    }

    pub fn src(&self) -> &Address {
        &self.src
    }

    pub fn dst(&self) -> &Address {
        &self.dst
    }

    pub fn seq(&self) -> SeqBit {
        self.seq
    }

    pub fn ack_num(&self) -> SeqBit {
        self.ack
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    /// Payload length, `0` when absent.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    pub fn kind(&self) -> PacketKind {
        match (self.is_syn(), self.is_ack(), self.is_fin()) {
            (true, true, _) => PacketKind::SynAck,
            (true, false, _) => PacketKind::Syn,
            (false, true, true) => PacketKind::FinAck,
            (false, false, true) => PacketKind::Fin,
            (false, true, false) => PacketKind::Ack,
            (false, false, false) => PacketKind::Data,
        }
    }

    /// Serialise into a newly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let src = self.src.as_str().as_bytes();
        let dst = self.dst.as_str().as_bytes();
        let src_len = u8::try_from(src.len()).map_err(|_| PacketError::AddressTooLong)?;
        let dst_len = u8::try_from(dst.len()).map_err(|_| PacketError::AddressTooLong)?;
        let payload = self.payload.as_deref().unwrap_or(&[]);
        let payload_len =
            u16::try_from(payload.len()).map_err(|_| PacketError::PayloadTooLong(payload.len()))?;

        let mut buf = Vec::with_capacity(HEADER_LEN + src.len() + dst.len() + payload.len());
        let mut wire_flags = self.flags;
        if self.payload.is_some() {
            wire_flags |= flags::PAYLOAD;
        }
        buf.push(wire_flags);
        buf.push(self.seq.value());
        buf.push(self.ack.value());
        buf.push(src_len);
        buf.push(dst_len);
        buf.extend_from_slice(&payload_len.to_be_bytes());
        buf.extend_from_slice(src);
        buf.extend_from_slice(dst);
        buf.extend_from_slice(payload);
        Ok(buf)
    }

    /// Parse a packet from a raw datagram.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < HEADER_LEN {
            return Err(PacketError::BufferTooShort);
        }

        let wire_flags = buf[OFF_FLAGS];
        if wire_flags & !(flags::SYN | flags::ACK | flags::FIN | flags::PAYLOAD) != 0 {
            return Err(PacketError::UnknownFlags(wire_flags));
        }
        let seq = SeqBit::new(buf[OFF_SEQ]).ok_or(PacketError::InvalidSeqBit(buf[OFF_SEQ]))?;
        let ack = SeqBit::new(buf[OFF_ACK]).ok_or(PacketError::InvalidSeqBit(buf[OFF_ACK]))?;
        let src_len = usize::from(buf[OFF_SRC_LEN]);
        let dst_len = usize::from(buf[OFF_DST_LEN]);
        let payload_len =
            usize::from(u16::from_be_bytes([buf[OFF_PAYLOAD_LEN], buf[OFF_PAYLOAD_LEN + 1]]));

        if buf.len() != HEADER_LEN + src_len + dst_len + payload_len {
            return Err(PacketError::LengthMismatch);
        }

        let src_end = HEADER_LEN + src_len;
        let dst_end = src_end + dst_len;
        let src = std::str::from_utf8(&buf[HEADER_LEN..src_end])
            .map_err(|_| PacketError::InvalidAddress)?;
        let dst =
            std::str::from_utf8(&buf[src_end..dst_end]).map_err(|_| PacketError::InvalidAddress)?;

        let control = wire_flags & !flags::PAYLOAD;
        let has_payload = wire_flags & flags::PAYLOAD != 0;
        if control & flags::SYN != 0 && control & flags::FIN != 0 {
            return Err(PacketError::InvalidCombination);
        }
        // Control packets never carry a payload; data packets always do.
        if has_payload != (control == 0) || (!has_payload && payload_len != 0) {
            return Err(PacketError::InvalidCombination);
        }

        Ok(Packet {
            src: Address::new(src),
            dst: Address::new(dst),
            seq,
            ack,
            flags: control,
            payload: has_payload.then(|| buf[dst_end..].to_vec()),
        })
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{} seq={} ack={} SYN={} ACK={} FIN={} len={}",
            self.kind(),
            self.src,
            self.dst,
            self.seq,
            self.ack,
            u8::from(self.is_syn()),
            u8::from(self.is_ack()),
            u8::from(self.is_fin()),
            self.payload_len()
        )
    }
}

/// Errors from encoding or decoding a packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    #[error("length fields do not match the buffer length")]
    LengthMismatch,
    #[error("sequence bit out of range: {0}")]
    InvalidSeqBit(u8),
    #[error("unknown flag bits: {0:#010b}")]
    UnknownFlags(u8),
    #[error("address is not valid UTF-8")]
    InvalidAddress,
    #[error("address longer than 255 bytes")]
    AddressTooLong,
    #[error("payload of {0} bytes exceeds 65535")]
    PayloadTooLong(usize),
    #[error("flag combination does not describe a single packet kind")]
    InvalidCombination,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Address {
        Address::new("A")
    }

    fn b() -> Address {
        Address::new("B")
    }

    #[test]
    fn seq_bit_alternates() {
        assert_eq!(SeqBit::ZERO.flip(), SeqBit::ONE);
        assert_eq!(SeqBit::ONE.flip(), SeqBit::ZERO);
        assert_eq!(SeqBit::ZERO.prev(), SeqBit::ONE);
        assert_eq!(SeqBit::new(2), None);
    }

    #[test]
    fn constructors_classify() {
        assert_eq!(Packet::syn(a(), b()).kind(), PacketKind::Syn);
        assert_eq!(Packet::syn_ack(b(), a()).kind(), PacketKind::SynAck);
        assert_eq!(Packet::ack(a(), b(), SeqBit::ONE).kind(), PacketKind::Ack);
        assert_eq!(Packet::fin(a(), b(), SeqBit::ONE).kind(), PacketKind::Fin);
        assert_eq!(Packet::fin_ack(b(), a()).kind(), PacketKind::FinAck);
        assert_eq!(Packet::data(a(), b(), SeqBit::ZERO, vec![1]).kind(), PacketKind::Data);
    }

    #[test]
    fn control_packets_have_no_payload() {
        for pkt in [
            Packet::syn(a(), b()),
            Packet::syn_ack(b(), a()),
            Packet::ack(b(), a(), SeqBit::ZERO),
            Packet::fin(a(), b(), SeqBit::ONE),
            Packet::fin_ack(b(), a()),
        ] {
            assert!(pkt.payload().is_none(), "{pkt}");
            assert_eq!(pkt.payload_len(), 0);
        }
    }

    #[test]
    fn fin_carries_sequence_number() {
        let fin = Packet::fin(a(), b(), SeqBit::ONE);
        assert_eq!(fin.seq(), SeqBit::ONE);
        assert!(fin.is_fin());
        assert!(!fin.is_ack());
    }

    #[test]
    fn data_roundtrip_preserves_fields() {
        let pkt = Packet::data(a(), b(), SeqBit::ONE, b"hello".to_vec());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded, pkt);
    }

    #[test]
    fn empty_data_payload_survives_roundtrip() {
        let pkt = Packet::data(a(), b(), SeqBit::ZERO, Vec::new());
        let decoded = Packet::decode(&pkt.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload(), Some(&[][..]));
    }

    #[test]
    fn encoded_length_equals_header_plus_variable_parts() {
        let bytes = Packet::data(a(), b(), SeqBit::ZERO, vec![0; 12]).encode().unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 1 + 1 + 12);
        assert_eq!(bytes[OFF_FLAGS], flags::PAYLOAD);
    }

    #[test]
    fn decode_short_buffer_fails() {
        assert_eq!(Packet::decode(&[]), Err(PacketError::BufferTooShort));
        assert_eq!(
            Packet::decode(&[0u8; HEADER_LEN - 1]),
            Err(PacketError::BufferTooShort)
        );
    }

    #[test]
    fn decode_truncated_payload_fails() {
        let mut bytes = Packet::data(a(), b(), SeqBit::ZERO, b"data".to_vec())
            .encode()
            .unwrap();
        bytes.pop();
        assert_eq!(Packet::decode(&bytes), Err(PacketError::LengthMismatch));
    }

    #[test]
    fn decode_rejects_wide_sequence_number() {
        let mut bytes = Packet::syn(a(), b()).encode().unwrap();
        bytes[OFF_SEQ] = 2;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::InvalidSeqBit(2)));
    }

    #[test]
    fn decode_rejects_payload_on_control_packet() {
        let mut bytes = Packet::data(a(), b(), SeqBit::ZERO, b"x".to_vec())
            .encode()
            .unwrap();
        bytes[OFF_FLAGS] |= flags::ACK;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::InvalidCombination));
    }

    #[test]
    fn decode_rejects_syn_fin() {
        let mut bytes = Packet::syn(a(), b()).encode().unwrap();
        bytes[OFF_FLAGS] |= flags::FIN;
        assert_eq!(Packet::decode(&bytes), Err(PacketError::InvalidCombination));
    }

    #[test]
    fn decode_rejects_unknown_flags() {
        let mut bytes = Packet::ack(b(), a(), SeqBit::ONE).encode().unwrap();
        bytes[OFF_FLAGS] |= 0b0100_0000;
        assert!(matches!(
            Packet::decode(&bytes),
            Err(PacketError::UnknownFlags(_))
        ));
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let pkt = Packet::data(a(), b(), SeqBit::ZERO, vec![0; 70_000]);
        assert_eq!(pkt.encode(), Err(PacketError::PayloadTooLong(70_000)));
    }

    #[test]
    fn display_lists_all_fields() {
        let text = Packet::data(a(), b(), SeqBit::ONE, vec![0; 3]).to_string();
        assert_eq!(text, "DATA A->B seq=1 ack=0 SYN=0 ACK=0 FIN=0 len=3");
    }
}
