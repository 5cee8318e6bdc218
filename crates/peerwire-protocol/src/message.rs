//! Message-type registry and control payload codecs.
//!
//! The first byte of every (inverse-transformed) payload region names the
//! message type. Values 0–5 are defined below, 6–54 are reserved, and 55
//! upward belong to the host application.

use std::convert::TryFrom;

use byteorder::{BigEndian, ByteOrder};
use peerwire_core::error::{ErrorKind, Result};

/// First message-type value available to host applications.
pub const USER_MESSAGE_START: u8 = 55;

/// The message types defined by the library.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    /// Generic application data; no specific meaning implied.
    Data = 0,
    /// Keepalive probe carrying a microsecond timestamp. Library-internal.
    Ping = 1,
    /// Echo of a [`MessageKind::Ping`] timestamp. Library-internal.
    Pong = 2,
    /// Synthesized locally when a peer is first observed. Never on the wire.
    PeerConnected = 3,
    /// Synthesized locally when a peer times out. Never on the wire.
    PeerDisconnected = 4,
    /// Synthesized locally with the rolling round-trip average. Never on
    /// the wire.
    Latency = 5,
}

impl MessageKind {
    /// Returns the wire value for this kind.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = ErrorKind;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(MessageKind::Data),
            1 => Ok(MessageKind::Ping),
            2 => Ok(MessageKind::Pong),
            3 => Ok(MessageKind::PeerConnected),
            4 => Ok(MessageKind::PeerDisconnected),
            5 => Ok(MessageKind::Latency),
            _ => Err(ErrorKind::InvalidPacket),
        }
    }
}

/// Whether this type is consumed by the library itself and never surfaced
/// to the application handler.
pub fn is_library_internal(value: u8) -> bool {
    value == MessageKind::Ping.to_u8() || value == MessageKind::Pong.to_u8()
}

/// Whether an *inbound* datagram carrying this type is malformed: the
/// locally-synthesized kinds (3–5) and the reserved range (6–54) have no
/// wire semantics.
pub fn is_reserved_inbound(value: u8) -> bool {
    (MessageKind::PeerConnected.to_u8()..USER_MESSAGE_START).contains(&value)
}

/// Whether the public send surface accepts this type: application data and
/// host-defined types only.
pub fn is_sendable(value: u8) -> bool {
    value == MessageKind::Data.to_u8() || value >= USER_MESSAGE_START
}

/// Encodes a PING/PONG timestamp (microseconds) big-endian.
pub fn encode_timestamp(timestamp_us: u64) -> [u8; 8] {
    let mut out = [0u8; 8];
    BigEndian::write_u64(&mut out, timestamp_us);
    out
}

/// Decodes the 8-byte timestamp of a PING/PONG payload (the bytes after
/// the message-type byte). Fails with [`ErrorKind::InvalidPacket`] if the
/// payload is too short.
pub fn decode_timestamp(data: &[u8]) -> Result<u64> {
    if data.len() < 8 {
        return Err(ErrorKind::InvalidPacket);
    }
    Ok(BigEndian::read_u64(&data[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_values_match_wire_table() {
        assert_eq!(MessageKind::Data.to_u8(), 0);
        assert_eq!(MessageKind::Ping.to_u8(), 1);
        assert_eq!(MessageKind::Pong.to_u8(), 2);
        assert_eq!(MessageKind::PeerConnected.to_u8(), 3);
        assert_eq!(MessageKind::PeerDisconnected.to_u8(), 4);
        assert_eq!(MessageKind::Latency.to_u8(), 5);
        assert_eq!(USER_MESSAGE_START, 55);
    }

    #[test]
    fn test_try_from_round_trip() {
        for value in 0..=5u8 {
            assert_eq!(MessageKind::try_from(value).unwrap().to_u8(), value);
        }
        assert!(MessageKind::try_from(6).is_err());
        assert!(MessageKind::try_from(200).is_err());
    }

    #[test]
    fn test_classification() {
        assert!(is_library_internal(1));
        assert!(is_library_internal(2));
        assert!(!is_library_internal(0));

        assert!(is_reserved_inbound(3));
        assert!(is_reserved_inbound(5));
        assert!(is_reserved_inbound(54));
        assert!(!is_reserved_inbound(55));
        assert!(!is_reserved_inbound(0));

        assert!(is_sendable(0));
        assert!(is_sendable(55));
        assert!(is_sendable(255));
        assert!(!is_sendable(1));
        assert!(!is_sendable(42));
    }

    #[test]
    fn test_timestamp_round_trip() {
        let encoded = encode_timestamp(0x0102_0304_0506_0708);
        assert_eq!(encoded, [1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(decode_timestamp(&encoded).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_timestamp_too_short() {
        assert!(matches!(decode_timestamp(&[1, 2, 3]), Err(ErrorKind::InvalidPacket)));
    }
}
