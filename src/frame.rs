//! Wire format and framing.
//!
//! Every frame is an 18-byte header followed by up to 232 payload bytes:
//!
//! ```text
//! offset  size  field
//! 0       2     network id (little-endian, currently always 0)
//! 2       1     frame type (0=unconfirmed, 1=confirmed, 3=ack)
//! 3       1     message id (per-source counter)
//! 4       1     hop count (decremented by each forwarder)
//! 5       6     source address
//! 11      6     destination address
//! 17      1     payload length (0..=232)
//! 18      len   payload
//! ```
//!
//! Encoding and decoding are explicit field-by-field operations with
//! bounded length checks; a frame is never produced by reinterpreting
//! struct memory. `decode` rejects anything that does not parse exactly:
//! short headers, unknown type values, a zero hop count, an oversize
//! length field, or a buffer whose size disagrees with the length field.

use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Fixed header size in bytes
pub const HEADER_LEN: usize = 18;

/// Maximum payload size in bytes
pub const MAX_PAYLOAD_LEN: usize = 232;

/// Maximum on-wire frame size in bytes
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN;

/// On-wire frame type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Fire-and-forget datagram
    Unconfirmed = 0,
    /// End-to-end acknowledged datagram
    Confirmed = 1,
    /// Zero-payload acknowledgement of a confirmed datagram
    Ack = 3,
}

impl FrameType {
    /// Parse from the wire byte. Value 2 is reserved and treated as
    /// invalid, like any other unassigned value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FrameType::Unconfirmed),
            1 => Some(FrameType::Confirmed),
            3 => Some(FrameType::Ack),
            _ => None,
        }
    }

    /// Wire byte value
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

/// Engine-level message discriminator.
///
/// Extends [`FrameType`] with `Forwarded` so that relaying a frame and
/// consuming it locally are tracked independently: a node that has
/// forwarded a frame can still deliver it when it is also the
/// destination, and a confirmed frame never aliases its acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Unconfirmed,
    Confirmed,
    Forwarded,
    Ack,
}

impl From<FrameType> for MessageKind {
    fn from(frame_type: FrameType) -> Self {
        match frame_type {
            FrameType::Unconfirmed => MessageKind::Unconfirmed,
            FrameType::Confirmed => MessageKind::Confirmed,
            FrameType::Ack => MessageKind::Ack,
        }
    }
}

/// A complete mesh frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Network identifier (reserved, currently always 0)
    pub network_id: u16,
    /// Frame type
    pub frame_type: FrameType,
    /// Per-source message identifier
    pub id: u8,
    /// Remaining forwarding budget, `>= 1` on the wire
    pub hop_count: u8,
    /// Original source address
    pub src: Address,
    /// Ultimate destination address
    pub dst: Address,
    /// Payload, at most [`MAX_PAYLOAD_LEN`] bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create an acknowledgement for a confirmed frame: same id, zero
    /// payload, addressed back to the original source.
    pub fn ack(network_id: u16, id: u8, src: Address, dst: Address, hop_count: u8) -> Self {
        Self {
            network_id,
            frame_type: FrameType::Ack,
            id,
            hop_count,
            src,
            dst,
            payload: Vec::new(),
        }
    }

    /// Total on-wire size of this frame
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= MAX_PAYLOAD_LEN);
        let mut bytes = Vec::with_capacity(self.wire_len());
        bytes.extend_from_slice(&self.network_id.to_le_bytes());
        bytes.push(self.frame_type.as_byte());
        bytes.push(self.id);
        bytes.push(self.hop_count);
        bytes.extend_from_slice(self.src.as_bytes());
        bytes.extend_from_slice(self.dst.as_bytes());
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Deserialize from wire bytes. Returns `None` for anything
    /// malformed; the engine drops such frames silently.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN {
            return None;
        }
        let network_id = u16::from_le_bytes([bytes[0], bytes[1]]);
        let frame_type = FrameType::from_byte(bytes[2])?;
        let id = bytes[3];
        let hop_count = bytes[4];
        if hop_count == 0 {
            return None;
        }
        let src = Address::from_bytes(bytes[5..11].try_into().ok()?);
        let dst = Address::from_bytes(bytes[11..17].try_into().ok()?);
        let len = bytes[17] as usize;
        if len > MAX_PAYLOAD_LEN || bytes.len() != HEADER_LEN + len {
            return None;
        }
        Some(Self {
            network_id,
            frame_type,
            id,
            hop_count,
            src,
            dst,
            payload: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Address = Address::from_bytes([0xAA, 0, 0, 0, 0, 1]);
    const DST: Address = Address::from_bytes([0xBB, 0, 0, 0, 0, 2]);

    fn sample(frame_type: FrameType, payload: &[u8]) -> Frame {
        Frame {
            network_id: 0,
            frame_type,
            id: 7,
            hop_count: 3,
            src: SRC,
            dst: DST,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let frame = sample(FrameType::Confirmed, &[0xDE, 0xAD, 0xBE, 0xEF]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let frame = sample(FrameType::Ack, &[]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_roundtrip_max_payload() {
        let frame = sample(FrameType::Unconfirmed, &[0x55; MAX_PAYLOAD_LEN]);
        let bytes = frame.encode();
        assert_eq!(bytes.len(), MAX_FRAME_LEN);
        assert_eq!(Frame::decode(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_decode_short_header() {
        let frame = sample(FrameType::Unconfirmed, &[]);
        let bytes = frame.encode();
        assert!(Frame::decode(&bytes[..HEADER_LEN - 1]).is_none());
        assert!(Frame::decode(&[]).is_none());
    }

    #[test]
    fn test_decode_reserved_type() {
        let mut bytes = sample(FrameType::Unconfirmed, &[1, 2]).encode();
        bytes[2] = 2;
        assert!(Frame::decode(&bytes).is_none());
        bytes[2] = 0xFF;
        assert!(Frame::decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_zero_hop_count() {
        let mut bytes = sample(FrameType::Unconfirmed, &[1, 2]).encode();
        bytes[4] = 0;
        assert!(Frame::decode(&bytes).is_none());
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = sample(FrameType::Unconfirmed, &[1, 2, 3]).encode();
        // length field disagrees with buffer size
        bytes[17] = 2;
        assert!(Frame::decode(&bytes).is_none());
        // trailing garbage
        let mut long = sample(FrameType::Unconfirmed, &[1, 2, 3]).encode();
        long.push(0);
        assert!(Frame::decode(&long).is_none());
    }

    #[test]
    fn test_decode_oversize_length() {
        let mut bytes = vec![0u8; HEADER_LEN + 240];
        bytes[4] = 3;
        bytes[17] = 240;
        assert!(Frame::decode(&bytes).is_none());
    }

    #[test]
    fn test_ack_constructor() {
        let ack = Frame::ack(0, 42, DST, SRC, 3);
        assert_eq!(ack.frame_type, FrameType::Ack);
        assert_eq!(ack.id, 42);
        assert!(ack.payload.is_empty());
        assert_eq!(ack.src, DST);
        assert_eq!(ack.dst, SRC);
    }

    #[test]
    fn test_message_kind_mapping() {
        assert_eq!(MessageKind::from(FrameType::Confirmed), MessageKind::Confirmed);
        assert_ne!(MessageKind::Forwarded, MessageKind::from(FrameType::Confirmed));
    }
}
