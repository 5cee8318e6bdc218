use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};

use peerwire_core::{constants::LATENCY_WINDOW, identity::OwnerId};

/// Rolling round-trip accumulators. Rather than a true sliding window the
/// pair is reset to zero once it holds [`LATENCY_WINDOW`] samples, so the
/// reported average always reflects the most recent few round trips.
#[derive(Debug, Clone, Copy, Default)]
struct LatencyWindow {
    sum_us: u64,
    samples: u32,
}

impl LatencyWindow {
    fn record(&mut self, rtt_us: u64) {
        if self.samples >= LATENCY_WINDOW {
            self.sum_us = 0;
            self.samples = 0;
        }
        self.sum_us += rtt_us;
        self.samples += 1;
    }

    fn average_us(&self) -> u64 {
        if self.samples == 0 {
            return 0;
        }
        self.sum_us / self.samples as u64
    }
}

/// State kept for a single remote endpoint.
///
/// A record is created on the first datagram from an unknown owner id (or
/// seeded through the registry) and refreshed on every subsequent datagram.
/// The registry holds the only mutable copy; handlers receive clones.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    owner_id: OwnerId,
    client_id: [u8; 2],
    addr: SocketAddr,
    last_seen: Instant,
    last_seq: u16,
    latency: LatencyWindow,
    announced: bool,
}

impl RemotePeer {
    /// Creates a record for a peer known only by address and client id,
    /// e.g. to start pinging it before it has sent anything. The owner id
    /// is derived exactly as it would be from that peer's datagrams.
    pub fn new(addr: SocketAddr, client_id: [u8; 2], now: Instant) -> Self {
        Self::with_owner(OwnerId::from_socket_addr(addr, &client_id), client_id, addr, now)
    }

    /// Creates a record with a pre-computed owner id (the receive path,
    /// which has already hashed the frame prefix).
    pub fn with_owner(
        owner_id: OwnerId,
        client_id: [u8; 2],
        addr: SocketAddr,
        now: Instant,
    ) -> Self {
        Self {
            owner_id,
            client_id,
            addr,
            last_seen: now,
            last_seq: 0,
            latency: LatencyWindow::default(),
            announced: false,
        }
    }

    /// The stable identifier for this peer.
    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// The 2-byte client id this peer stamps into its datagrams.
    pub fn client_id(&self) -> [u8; 2] {
        self.client_id
    }

    /// The source address of the most recent datagram from this peer.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The sequence number of the most recent datagram from this peer.
    pub fn last_seq(&self) -> u16 {
        self.last_seq
    }

    /// When this peer was last heard from.
    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// How long this peer has been silent.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    /// The rolling round-trip average in microseconds; 0 before the first
    /// PONG arrives.
    pub fn latency_us(&self) -> u64 {
        self.latency.average_us()
    }

    /// Refreshes address, sequence, and last-seen on an inbound datagram.
    /// The address is updated every time: some NATs rebind ports at
    /// random, and outgoing data must go to the latest observed endpoint.
    pub fn touch(&mut self, addr: SocketAddr, seq: u16, now: Instant) {
        self.addr = addr;
        self.last_seq = seq;
        self.last_seen = now;
    }

    /// Folds one measured round trip into the rolling window and returns
    /// the new average.
    pub fn record_latency_sample(&mut self, rtt_us: u64) -> u64 {
        self.latency.record(rtt_us);
        self.latency.average_us()
    }

    /// Marks this peer as announced to the application. Returns `true`
    /// exactly once, so the caller emits a single connected event before
    /// any data for this peer.
    pub fn mark_announced(&mut self) -> bool {
        if self.announced {
            return false;
        }
        self.announced = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    #[test]
    fn test_new_derives_owner_from_addr_and_client_id() {
        let now = Instant::now();
        let peer = RemotePeer::new(addr(4000), [0x00, 0x01], now);
        let expected = OwnerId::from_addr("127.0.0.1".parse().unwrap(), &[0x00, 0x01]);
        assert_eq!(peer.owner_id(), expected);
        assert_eq!(peer.latency_us(), 0);
    }

    #[test]
    fn test_owner_ignores_port() {
        let now = Instant::now();
        let a = RemotePeer::new(addr(4000), [0, 1], now);
        let b = RemotePeer::new(addr(5000), [0, 1], now);
        assert_eq!(a.owner_id(), b.owner_id());
    }

    #[test]
    fn test_touch_refreshes_address_and_sequence() {
        let start = Instant::now();
        let mut peer = RemotePeer::new(addr(4000), [0, 1], start);

        let later = start + Duration::from_millis(250);
        peer.touch(addr(4001), 77, later);

        assert_eq!(peer.addr(), addr(4001));
        assert_eq!(peer.last_seq(), 77);
        assert_eq!(peer.idle_for(later), Duration::ZERO);
        assert_eq!(peer.idle_for(later + Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn test_latency_average() {
        let mut peer = RemotePeer::new(addr(4000), [0, 1], Instant::now());
        peer.record_latency_sample(100);
        peer.record_latency_sample(300);
        assert_eq!(peer.latency_us(), 200);
    }

    #[test]
    fn test_latency_window_resets_after_ten_samples() {
        let mut peer = RemotePeer::new(addr(4000), [0, 1], Instant::now());
        for _ in 0..10 {
            peer.record_latency_sample(1000);
        }
        assert_eq!(peer.latency_us(), 1000);

        // The 11th sample starts a fresh window.
        let average = peer.record_latency_sample(20);
        assert_eq!(average, 20);
        assert_eq!(peer.latency_us(), 20);
    }

    #[test]
    fn test_mark_announced_fires_once() {
        let mut peer = RemotePeer::new(addr(4000), [0, 1], Instant::now());
        assert!(peer.mark_announced());
        assert!(!peer.mark_announced());
    }
}
