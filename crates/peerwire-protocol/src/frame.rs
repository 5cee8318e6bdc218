//! Frame accessors over a received datagram and header writers for the
//! send path.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use peerwire_core::{
    constants::{ADDR_PREFIX_SIZE, DATA_HEADER_SIZE, FRAGMENT_HEADER_SIZE},
    error::{ErrorKind, Result},
    identity::OwnerId,
};

/// Per-datagram flag byte.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    /// The payload region went through the compression stage.
    pub const COMPRESSED: u8 = 0x01;
    /// The payload region went through the encryption stage.
    pub const ENCRYPTED: u8 = 0x02;
    /// This datagram is one part of a larger message.
    pub const FRAGMENTED: u8 = 0x04;

    /// Wraps a raw flag byte. Unknown bits are kept as received and
    /// ignored.
    pub fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Returns the raw flag byte.
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Sets the given flag bit(s).
    pub fn insert(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Whether the COMPRESSED bit is set.
    pub fn is_compressed(&self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Whether the ENCRYPTED bit is set.
    pub fn is_encrypted(&self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    /// Whether the FRAGMENTED bit is set.
    pub fn is_fragmented(&self) -> bool {
        self.0 & Self::FRAGMENTED != 0
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Flags(0x{:02x})", self.0)
    }
}

// Field offsets within the reconstructed buffer (source address prefix
// included).
const CLIENT_ID_OFFSET: usize = ADDR_PREFIX_SIZE;
const FLAGS_OFFSET: usize = ADDR_PREFIX_SIZE + 2;
const SEQUENCE_OFFSET: usize = ADDR_PREFIX_SIZE + 3;
const SUB_SEQUENCE_OFFSET: usize = ADDR_PREFIX_SIZE + 5;

/// A validated, zero-copy view over a single received datagram.
///
/// The underlying buffer is the datagram bytes with the observed 16-byte
/// source IPv6 address prepended by the receive loop.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    buf: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Validates the buffer structurally and wraps it.
    ///
    /// Requires the address prefix, the framing header indicated by the
    /// flag byte, and at least one payload byte (the message type). For
    /// fragmented frames the sub-sequence must satisfy `total >= 2` and
    /// `index < total`. Fails with [`ErrorKind::InvalidPacket`].
    pub fn parse(buf: &'a [u8]) -> Result<Frame<'a>> {
        if buf.len() <= ADDR_PREFIX_SIZE + DATA_HEADER_SIZE {
            return Err(ErrorKind::InvalidPacket);
        }

        let frame = Frame { buf };
        if frame.flags().is_fragmented() {
            if buf.len() <= ADDR_PREFIX_SIZE + FRAGMENT_HEADER_SIZE {
                return Err(ErrorKind::InvalidPacket);
            }
            let (index, total) = frame.sub_sequence();
            if total < 2 || index >= total {
                return Err(ErrorKind::InvalidPacket);
            }
        }
        Ok(frame)
    }

    /// The source IPv6 address injected by the receiver.
    pub fn source_ipv6(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out.copy_from_slice(&self.buf[..ADDR_PREFIX_SIZE]);
        out
    }

    /// The sender's 2-byte client id.
    pub fn client_id(&self) -> [u8; 2] {
        [self.buf[CLIENT_ID_OFFSET], self.buf[CLIENT_ID_OFFSET + 1]]
    }

    /// The flag byte.
    pub fn flags(&self) -> Flags {
        Flags::from_bits(self.buf[FLAGS_OFFSET])
    }

    /// The per-sender datagram sequence number.
    pub fn sequence(&self) -> u16 {
        BigEndian::read_u16(&self.buf[SEQUENCE_OFFSET..SEQUENCE_OFFSET + 2])
    }

    /// The `(index, total)` sub-sequence; `(0, 1)` when not fragmented.
    pub fn sub_sequence(&self) -> (u8, u8) {
        if self.flags().is_fragmented() {
            (self.buf[SUB_SEQUENCE_OFFSET], self.buf[SUB_SEQUENCE_OFFSET + 1])
        } else {
            (0, 1)
        }
    }

    /// The payload region: everything after the framing header. Its first
    /// byte is the message type once inverse transforms have run.
    pub fn payload(&self) -> &'a [u8] {
        if self.flags().is_fragmented() {
            &self.buf[ADDR_PREFIX_SIZE + FRAGMENT_HEADER_SIZE..]
        } else {
            &self.buf[ADDR_PREFIX_SIZE + DATA_HEADER_SIZE..]
        }
    }

    /// The sender's owner id: MD5 over the source address and client id.
    pub fn owner(&self) -> OwnerId {
        let client_id = self.client_id();
        OwnerId::derive(&self.source_ipv6(), &client_id)
    }
}

impl fmt::Display for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (index, total) = self.sub_sequence();
        let id = self.client_id();
        write!(
            f,
            "[{:03}/{:03}] | 0x{:02x} | 0x{:04x} | {:02x} {:02x} | {} bytes",
            index,
            total,
            self.flags().bits(),
            self.sequence(),
            id[0],
            id[1],
            self.payload().len()
        )
    }
}

/// Stamps the 5-byte data header at the start of `buf`.
pub fn write_data_header(buf: &mut [u8], client_id: &[u8; 2], flags: Flags, sequence: u16) {
    buf[0] = client_id[0];
    buf[1] = client_id[1];
    buf[2] = flags.bits();
    BigEndian::write_u16(&mut buf[3..5], sequence);
}

/// Stamps the 7-byte fragment header at the start of `buf`. The flag byte
/// is written as given; callers set FRAGMENTED beforehand.
pub fn write_fragment_header(
    buf: &mut [u8],
    client_id: &[u8; 2],
    flags: Flags,
    sequence: u16,
    index: u8,
    total: u8,
) {
    write_data_header(buf, client_id, flags, sequence);
    buf[5] = index;
    buf[6] = total;
}
