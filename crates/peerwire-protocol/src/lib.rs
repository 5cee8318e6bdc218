#![warn(missing_docs)]

//! peerwire-protocol: the on-wire format.
//!
//! A datagram is framed as `[client id:2][flags:1][sequence:2]`, with a
//! `[index:1][total:1]` sub-sequence inserted when the FRAGMENTED flag is
//! set, followed by the payload region. The first payload byte is the
//! message type; the UDP datagram boundary is the framing — there are no
//! length prefixes. Multi-byte integers are big-endian.
//!
//! The receiver prepends the 16-byte source IPv6 address it observed to
//! the buffer before parsing, so the sender's owner id can be computed
//! from the first 18 bytes.

/// Payload budget math and fragment counting.
pub mod fragment;
/// Frame accessors, validation, and header writers.
pub mod frame;
/// Message-type registry and control payload codecs.
pub mod message;

pub use frame::{Flags, Frame};
pub use message::MessageKind;
