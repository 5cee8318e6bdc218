use std::{
    io,
    net::{SocketAddr, UdpSocket},
    time::Duration,
};

use peerwire_core::{config::Config, error::Result, transport::DatagramSocket};
use socket2::Socket as Socket2;

/// A bound UDP socket ready for the engine: kernel buffers, TTL, and
/// broadcast set per [`Config`], reads bounded so the receive loop
/// observes `close()` promptly.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds to `addr` and configures the socket from `config`.
    pub fn bind(addr: SocketAddr, config: &Config) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;

        // std has no surface for the kernel buffer sizes; go through
        // socket2 for those when asked, leave the system defaults alone
        // otherwise.
        if config.socket_recv_buffer_size.is_some() || config.socket_send_buffer_size.is_some() {
            let raw = Socket2::from(socket.try_clone()?);
            if let Some(bytes) = config.socket_recv_buffer_size {
                raw.set_recv_buffer_size(bytes)?;
            }
            if let Some(bytes) = config.socket_send_buffer_size {
                raw.set_send_buffer_size(bytes)?;
            }
        }

        if let Some(ttl) = config.socket_ttl {
            socket.set_ttl(ttl)?;
        }
        socket.set_broadcast(config.socket_broadcast)?;
        if !config.read_timeout.is_zero() {
            socket.set_read_timeout(Some(config.read_timeout))?;
        }

        Ok(Self { socket })
    }
}

impl DatagramSocket for UdpTransport {
    fn send_to(&self, addr: &SocketAddr, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }

    fn recv_from(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buffer)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(timeout)
    }
}
