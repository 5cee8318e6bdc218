//! Transport abstraction for pluggable I/O.

use std::{io::Result, net::SocketAddr, time::Duration};

/// Low-level datagram socket abstraction.
///
/// This trait lets various transports (UDP, in-memory test doubles) be
/// plugged into the engine without coupling to a concrete socket type.
/// Implementations must be usable from multiple threads: the receive loop
/// reads while the ticker and application threads write.
pub trait DatagramSocket: Send + Sync {
    /// Sends a single datagram to the given address.
    fn send_to(&self, addr: &SocketAddr, payload: &[u8]) -> Result<usize>;

    /// Receives a single datagram into `buffer`, returning its length and
    /// source address. May time out (see
    /// [`DatagramSocket::set_read_timeout`]), in which case the error kind
    /// is `WouldBlock` or `TimedOut`.
    fn recv_from(&self, buffer: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Returns the local address this socket is bound to.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Bounds how long a single [`DatagramSocket::recv_from`] may block.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;
}
