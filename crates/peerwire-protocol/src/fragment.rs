//! Payload budget math for the send path.
//!
//! A message (the type byte plus the transformed data) either fits one
//! datagram or is split across fragments, each of which carries the larger
//! fragment header and consumes its own sequence number.

use peerwire_core::{
    constants::{DATA_HEADER_SIZE, FRAGMENT_HEADER_SIZE, MAX_FRAGMENTS, UDP_HEADER_SIZE},
    error::{ErrorKind, Result},
};

/// Largest message that still fits a single unfragmented datagram.
pub fn max_single_message(packet_size: usize) -> usize {
    packet_size - UDP_HEADER_SIZE - DATA_HEADER_SIZE
}

/// Message bytes carried by each fragment.
pub fn chunk_size(packet_size: usize) -> usize {
    packet_size - UDP_HEADER_SIZE - FRAGMENT_HEADER_SIZE
}

/// Number of fragments needed for a message of `message_len` bytes.
///
/// Fails with [`ErrorKind::PacketTooLarge`] when the count would not fit
/// the one-byte fragment total.
pub fn count_for(message_len: usize, packet_size: usize) -> Result<u8> {
    let chunk = chunk_size(packet_size);
    let count = message_len.div_ceil(chunk);
    if count > MAX_FRAGMENTS {
        return Err(ErrorKind::PacketTooLarge(message_len));
    }
    Ok(count as u8)
}
