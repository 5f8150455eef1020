// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 rdt-link contributors
//
// Wire packet codec (spec.md §3, §4.1).
//
// Fixed layout, no length prefix, little-endian. CRC-32 (standard polynomial)
// covers every byte preceding the `crc` field. Grounded on the header
// encode/decode + CRC pattern used for the reliable-UDP transport in this
// pack's `other_examples` (`ReliableUdpHeader::as_bytes`/`from_bytes`/
// `calculate_checksum`), adapted to a fixed total size instead of a
// variable-length payload, and using `crc32fast` for the checksum.

use crate::config::{PACKET_SIZE, PAYLOAD_SIZE};

/// The five packet kinds that appear on the wire (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceCode {
    Begin = 1,
    Data = 2,
    End = 3,
    Ask = 4,
    Nack = 5,
}

impl ServiceCode {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(ServiceCode::Begin),
            2 => Some(ServiceCode::Data),
            3 => Some(ServiceCode::End),
            4 => Some(ServiceCode::Ask),
            5 => Some(ServiceCode::Nack),
            _ => None,
        }
    }
}

/// Byte offset layout within the 250-byte frame.
mod layout {
    pub const CHANNEL: usize = 0;
    pub const SEQ_NUM: usize = 1;
    pub const SERVICE_CODE: usize = 3;
    pub const PAYLOAD: usize = 4;
    pub const PAYLOAD_END: usize = PAYLOAD + super::PAYLOAD_SIZE;
    // The named fields (channel + seq_num + service_code + payload + crc)
    // sum to 200 bytes; spec.md fixes the total frame at 250 bytes, matching
    // the underlying radio's MTU. The remaining 50 bytes are a zero-filled
    // reserved tail, written as zero on send and included in the CRC
    // (SPEC_FULL.md §3). It carries no semantics of its own.
    pub const RESERVED: usize = PAYLOAD_END;
    pub const RESERVED_LEN: usize = super::PACKET_SIZE - PAYLOAD_END - 4;
    pub const CRC: usize = RESERVED + RESERVED_LEN;
}

/// One 250-byte wire packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub channel: u8,
    pub seq_num: u16,
    pub service_code: ServiceCode,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    pub fn new(channel: u8, seq_num: u16, service_code: ServiceCode) -> Self {
        Self {
            channel,
            seq_num,
            service_code,
            payload: [0u8; PAYLOAD_SIZE],
        }
    }

    /// Build a packet whose payload is `data`, zero-padded to `PAYLOAD_SIZE`.
    /// `data.len()` must be `<= PAYLOAD_SIZE`.
    pub fn with_payload(channel: u8, seq_num: u16, service_code: ServiceCode, data: &[u8]) -> Self {
        debug_assert!(data.len() <= PAYLOAD_SIZE);
        let mut p = Self::new(channel, seq_num, service_code);
        p.payload[..data.len()].copy_from_slice(data);
        p
    }

    /// Serialize to the fixed 250-byte wire frame, computing the CRC.
    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[layout::CHANNEL] = self.channel;
        buf[layout::SEQ_NUM..layout::SEQ_NUM + 2].copy_from_slice(&self.seq_num.to_le_bytes());
        buf[layout::SERVICE_CODE] = self.service_code as u8;
        buf[layout::PAYLOAD..layout::PAYLOAD_END].copy_from_slice(&self.payload);
        // buf[layout::RESERVED..layout::CRC] is already zero.
        let crc = crc32fast::hash(&buf[..layout::CRC]);
        buf[layout::CRC..layout::CRC + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Parse and CRC-verify a received frame. Returns `None` on a length
    /// mismatch, an unrecognized service code, or a CRC mismatch — all three
    /// are transport-transient errors (spec.md §7): the caller drops the
    /// packet silently and records a counter, it never surfaces upward.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != PACKET_SIZE {
            return None;
        }
        let expected = crc32fast::hash(&bytes[..layout::CRC]);
        let actual = u32::from_le_bytes(bytes[layout::CRC..layout::CRC + 4].try_into().ok()?);
        if expected != actual {
            return None;
        }
        let service_code = ServiceCode::from_u8(bytes[layout::SERVICE_CODE])?;
        let seq_num = u16::from_le_bytes(bytes[layout::SEQ_NUM..layout::SEQ_NUM + 2].try_into().ok()?);
        let mut payload = [0u8; PAYLOAD_SIZE];
        payload.copy_from_slice(&bytes[layout::PAYLOAD..layout::PAYLOAD_END]);
        Some(Self {
            channel: bytes[layout::CHANNEL],
            seq_num,
            service_code,
            payload,
        })
    }
}

/// Number of packets needed to carry a `size`-byte block: BEGIN + data
/// payload packets + END (spec.md §3 invariant).
pub fn total_packets(size: usize) -> u16 {
    let data_packets = size.div_ceil(PAYLOAD_SIZE).max(1);
    (data_packets + 2) as u16
}

/// Encode a BEGIN packet's 4-byte little-endian size prefix (spec.md §4.2).
/// All-zero is reserved to mean "use `max_block_size`" on the receiver side.
pub fn begin_payload(size: u32) -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    payload[..4].copy_from_slice(&size.to_le_bytes());
    payload
}

/// Decode a BEGIN packet's size prefix.
pub fn decode_begin_size(payload: &[u8; PAYLOAD_SIZE]) -> u32 {
    u32::from_le_bytes(payload[..4].try_into().unwrap())
}

/// NACK sentinel terminating the missing-sequence list (spec.md §4.2).
pub const NACK_SENTINEL: u16 = 0xFFFF;

/// Encode a list of missing sequence numbers into a NACK payload, terminated
/// by `NACK_SENTINEL` or end of payload, whichever comes first.
pub fn encode_nack_payload(missing: &[u16]) -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    let max_entries = PAYLOAD_SIZE / 2;
    let mut i = 0;
    for &seq in missing.iter().take(max_entries.saturating_sub(1)) {
        payload[i * 2..i * 2 + 2].copy_from_slice(&seq.to_le_bytes());
        i += 1;
    }
    if i < max_entries {
        payload[i * 2..i * 2 + 2].copy_from_slice(&NACK_SENTINEL.to_le_bytes());
    }
    payload
}

/// Decode a NACK payload back into the list of missing sequence numbers.
pub fn decode_nack_payload(payload: &[u8; PAYLOAD_SIZE]) -> Vec<u16> {
    let mut out = Vec::new();
    for chunk in payload.chunks_exact(2) {
        let seq = u16::from_le_bytes([chunk[0], chunk[1]]);
        if seq == NACK_SENTINEL {
            break;
        }
        out.push(seq);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_size_is_250() {
        assert_eq!(PACKET_SIZE, 250);
        let p = Packet::new(2, 0, ServiceCode::Begin);
        assert_eq!(p.encode().len(), 250);
    }

    #[test]
    fn round_trips() {
        let p = Packet::with_payload(2, 3, ServiceCode::Data, b"hello");
        let bytes = p.encode();
        let decoded = Packet::decode(&bytes).expect("decode");
        assert_eq!(decoded, p);
    }

    #[test]
    fn bit_flip_fails_crc() {
        let p = Packet::with_payload(2, 3, ServiceCode::Data, b"hello");
        let mut bytes = p.encode();
        bytes[10] ^= 0x01;
        assert!(Packet::decode(&bytes).is_none());
    }

    #[test]
    fn wrong_length_rejected() {
        assert!(Packet::decode(&[0u8; 10]).is_none());
    }

    #[test]
    fn total_packets_matches_invariant() {
        // 600-byte block => ceil(600/192) + 2 = 4 + 2 = 6 total packets:
        // BEGIN(0), DATA(1..=4), END(5).
        assert_eq!(total_packets(600), 6);
    }

    #[test]
    fn nack_payload_round_trips_with_sentinel() {
        let missing = vec![2u16, 5, 9];
        let payload = encode_nack_payload(&missing);
        assert_eq!(decode_nack_payload(&payload), missing);
    }

    #[test]
    fn begin_size_round_trips() {
        let payload = begin_payload(600);
        assert_eq!(decode_begin_size(&payload), 600);
    }
}
