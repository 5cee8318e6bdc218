use std::time::Duration;

use crate::constants::{DEFAULT_IDLE_TIMEOUT, DEFAULT_PACKET_SIZE, DEFAULT_PING_INTERVAL};

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and engine behavior.
pub struct Config {
    /// Max total datagram size in bytes, including the 22-byte UDP/IP
    /// transport header. The payload budget of a single datagram is
    /// `packet_size - 22 - 5` (unfragmented) or `packet_size - 22 - 7`
    /// (per fragment).
    pub packet_size: usize,
    /// Interval between keepalive pings; `listen` uses this when called
    /// with a zero interval. Defaults to 10 seconds.
    pub ping_interval: Duration,
    /// Max idle time before a known peer is considered disconnected;
    /// `listen` uses this when called with a zero timeout. Defaults to
    /// 30 seconds.
    pub idle_timeout: Duration,
    /// Upper bound on a single blocking socket read. Keeps the receive
    /// loop responsive to `close()`; must be well below the close grace
    /// window.
    pub read_timeout: Duration,
    /// Max age of an incomplete fragment reassembly slot before it is
    /// dropped on the next keepalive tick.
    pub reassembly_timeout: Duration,
    /// How long `close()` waits for the worker threads to exit before
    /// detaching them.
    pub close_grace: Duration,
    /// Socket receive buffer size in bytes (None = system default).
    /// Corresponds to SO_RCVBUF.
    pub socket_recv_buffer_size: Option<usize>,
    /// Socket send buffer size in bytes (None = system default).
    /// Corresponds to SO_SNDBUF.
    pub socket_send_buffer_size: Option<usize>,
    /// Time-to-live for outgoing datagrams (None = system default).
    /// Corresponds to IP_TTL.
    pub socket_ttl: Option<u32>,
    /// Enable broadcast mode. Corresponds to SO_BROADCAST.
    pub socket_broadcast: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            ping_interval: DEFAULT_PING_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            read_timeout: Duration::from_millis(100),
            reassembly_timeout: Duration::from_secs(5),
            close_grace: Duration::from_secs(1),
            socket_recv_buffer_size: None,
            socket_send_buffer_size: None,
            socket_ttl: None,
            socket_broadcast: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tunables() {
        let config = Config::default();
        assert_eq!(config.packet_size, 1400);
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert!(config.read_timeout < config.close_grace);
    }

    #[test]
    fn test_default_socket_options() {
        let config = Config::default();
        assert_eq!(config.socket_recv_buffer_size, None);
        assert_eq!(config.socket_send_buffer_size, None);
        assert_eq!(config.socket_ttl, None);
        assert!(!config.socket_broadcast);
    }
}
