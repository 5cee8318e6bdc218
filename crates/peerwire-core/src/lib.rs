#![warn(missing_docs)]

//! peerwire-core: foundational types and utilities.
//!
//! This crate provides the minimal set of core pieces shared across all
//! layers:
//! - Configuration types
//! - Error handling
//! - Protocol constants
//! - Peer identity (client ids and owner ids)
//! - Pluggable payload transforms (compression/encryption)
//! - A datagram transport seam for pluggable I/O
//!
//! Wire-format logic lives in `peerwire-protocol`; per-peer state in
//! `peerwire-peer`; the socket engine in `peerwire-host`.

/// Protocol constants shared across layers.
pub mod constants {
    use std::time::Duration;

    /// The size of a standard UDP/IP transport header. It precedes every
    /// datagram on the wire and is consumed by the operating system; this
    /// library never sees it, but it counts toward the maximum datagram
    /// size ([`super::config::Config::packet_size`]).
    pub const UDP_HEADER_SIZE: usize = 22;

    /// Length of the IPv6 source address the receiver prepends to every
    /// inbound datagram before computing the sender's owner id.
    pub const ADDR_PREFIX_SIZE: usize = 16;

    /// Framing header size of an unfragmented datagram:
    /// client id (2) + flags (1) + sequence (2).
    pub const DATA_HEADER_SIZE: usize = 5;

    /// Framing header size of a fragment:
    /// client id (2) + flags (1) + sequence (2) + sub-sequence (2).
    pub const FRAGMENT_HEADER_SIZE: usize = 7;

    /// Smallest datagram this library will accept: a data header plus at
    /// least one payload byte carrying the message type.
    pub const MIN_DATAGRAM_SIZE: usize = 6;

    /// Default maximum size of a single UDP datagram, transport header
    /// included. 1400 is slightly below a typical Ethernet MTU and avoids
    /// IP-level fragmentation on most paths.
    pub const DEFAULT_PACKET_SIZE: usize = 1400;

    /// Largest number of fragments a single message may span; the wire
    /// carries the fragment count in one byte.
    pub const MAX_FRAGMENTS: usize = u8::MAX as usize;

    /// Stock keepalive interval ([`super::config::Config::ping_interval`]).
    pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

    /// Stock idle timeout ([`super::config::Config::idle_timeout`]).
    pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Number of round-trip samples accumulated before the rolling latency
    /// window starts over.
    pub const LATENCY_WINDOW: u32 = 10;
}

/// Configuration options to tune engine behavior.
pub mod config;
/// Error types and results.
pub mod error;
/// Client-id and owner-id derivation.
pub mod identity;
/// Monotonic time source abstraction.
pub mod time;
/// Pluggable payload transforms.
pub mod transform;
/// Transport abstraction for pluggable I/O.
pub mod transport;
