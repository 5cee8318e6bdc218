use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use peerwire_core::identity::OwnerId;
use tracing::warn;

use crate::{reassembly::Reassembly, remote::RemotePeer};

/// The set of remote peers known this session, keyed by owner id, plus
/// the per-owner reassembly slot for in-flight fragmented messages.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<OwnerId, RemotePeer>,
    reassembly: HashMap<OwnerId, Reassembly>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a peer record.
    pub fn get(&self, id: &OwnerId) -> Option<&RemotePeer> {
        self.peers.get(id)
    }

    /// Looks up a peer record mutably.
    pub fn get_mut(&mut self, id: &OwnerId) -> Option<&mut RemotePeer> {
        self.peers.get_mut(id)
    }

    /// Whether a peer with this owner id is known.
    pub fn has(&self, id: &OwnerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Adds a record if its owner id is not yet known. Returns `false`
    /// when an existing record was left untouched.
    pub fn add(&mut self, peer: RemotePeer) -> bool {
        use std::collections::hash_map::Entry;
        match self.peers.entry(peer.owner_id()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(peer);
                true
            }
        }
    }

    /// Removes a peer and any fragments it had in flight.
    pub fn remove(&mut self, id: &OwnerId) -> Option<RemotePeer> {
        self.reassembly.remove(id);
        self.peers.remove(id)
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = &RemotePeer> {
        self.peers.values()
    }

    /// Owner ids of peers that have been silent longer than `timeout`.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<OwnerId> {
        self.peers
            .values()
            .filter(|peer| peer.idle_for(now) > timeout)
            .map(|peer| peer.owner_id())
            .collect()
    }

    /// Current addresses of every known peer, for the keepalive fan-out.
    pub fn ping_targets(&self) -> Vec<SocketAddr> {
        self.peers.values().map(|peer| peer.addr()).collect()
    }

    /// Routes one fragment into the owner's reassembly slot and returns
    /// the full message once the last fragment lands.
    ///
    /// A fragment keyed differently from the in-flight slot (new base
    /// sequence or total) abandons the old slot and starts over: the old
    /// message can no longer complete once its sender has moved on.
    pub fn accept_fragment(
        &mut self,
        owner: OwnerId,
        base_sequence: u16,
        total: u8,
        index: u8,
        payload: &[u8],
        now: Instant,
    ) -> Option<Vec<u8>> {
        let slot = self
            .reassembly
            .entry(owner)
            .or_insert_with(|| Reassembly::new(base_sequence, total, now));

        if !slot.matches(base_sequence, total) {
            warn!(
                "Abandoning incomplete fragmented message from {} (base {}) for a newer one (base {})",
                owner,
                slot.base_sequence(),
                base_sequence
            );
            *slot = Reassembly::new(base_sequence, total, now);
        }

        let message = slot.accept(index, payload);
        if message.is_some() {
            self.reassembly.remove(&owner);
        }
        message
    }

    /// Drops incomplete reassembly slots older than `timeout`; returns how
    /// many were removed. Run periodically so lost fragments cannot pin
    /// memory forever.
    pub fn drop_stale_reassembly(&mut self, now: Instant, timeout: Duration) -> usize {
        let before = self.reassembly.len();
        self.reassembly.retain(|owner, slot| {
            let stale = slot.is_stale(now, timeout);
            if stale {
                warn!("Dropping stale fragment reassembly slot for {}", owner);
            }
            !stale
        });
        before - self.reassembly.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{}", port).parse().unwrap()
    }

    fn record(port: u16, client_id: [u8; 2], now: Instant) -> RemotePeer {
        RemotePeer::new(addr(port), client_id, now)
    }

    #[test]
    fn test_add_get_remove() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        let peer = record(4000, [0, 1], now);
        let id = peer.owner_id();

        assert!(registry.add(peer));
        assert!(registry.has(&id));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().client_id(), [0, 1]);

        assert!(registry.remove(&id).is_some());
        assert!(!registry.has(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_keeps_existing_record() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        assert!(registry.add(record(4000, [0, 1], now)));
        // Same ip + client id, different port: same owner id.
        assert!(!registry.add(record(5000, [0, 1], now)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().addr(), addr(4000));
    }

    #[test]
    fn test_expired_scan() {
        let start = Instant::now();
        let mut registry = PeerRegistry::new();

        let fresh = record(4000, [0, 1], start + Duration::from_secs(9));
        let silent = record(4000, [0, 2], start);
        let silent_id = silent.owner_id();
        registry.add(fresh);
        registry.add(silent);

        let now = start + Duration::from_secs(10);
        let expired = registry.expired(now, Duration::from_secs(5));
        assert_eq!(expired, vec![silent_id]);
    }

    #[test]
    fn test_ping_targets_cover_all_peers() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        registry.add(record(4000, [0, 1], now));
        registry.add(record(4001, [0, 2], now));

        let mut targets = registry.ping_targets();
        targets.sort();
        assert_eq!(targets, vec![addr(4000), addr(4001)]);
    }

    #[test]
    fn test_fragment_routing_completes_message() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        let peer = record(4000, [0, 1], now);
        let owner = peer.owner_id();
        registry.add(peer);

        assert!(registry.accept_fragment(owner, 10, 2, 0, &[1], now).is_none());
        assert_eq!(registry.accept_fragment(owner, 10, 2, 1, &[2], now).unwrap(), vec![1, 2]);

        // The slot was drained; a fresh message starts clean.
        assert!(registry.accept_fragment(owner, 12, 2, 0, &[3], now).is_none());
    }

    #[test]
    fn test_fragment_with_new_base_restarts_slot() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        let owner = record(4000, [0, 1], now).owner_id();

        assert!(registry.accept_fragment(owner, 10, 3, 0, &[1], now).is_none());
        // The sender moved on to a new message before finishing the first.
        assert!(registry.accept_fragment(owner, 20, 2, 0, &[7], now).is_none());
        assert_eq!(registry.accept_fragment(owner, 20, 2, 1, &[8], now).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_interleaved_messages_do_not_mix() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        let a = record(4000, [0, 1], now).owner_id();
        let b = record(4000, [0, 2], now).owner_id();

        assert!(registry.accept_fragment(a, 10, 2, 0, &[1], now).is_none());
        assert!(registry.accept_fragment(b, 10, 2, 0, &[9], now).is_none());
        assert_eq!(registry.accept_fragment(a, 10, 2, 1, &[2], now).unwrap(), vec![1, 2]);
        assert_eq!(registry.accept_fragment(b, 10, 2, 1, &[8], now).unwrap(), vec![9, 8]);
    }

    #[test]
    fn test_stale_reassembly_cleanup() {
        let start = Instant::now();
        let mut registry = PeerRegistry::new();
        let owner = record(4000, [0, 1], start).owner_id();

        registry.accept_fragment(owner, 10, 3, 0, &[1], start);
        assert_eq!(registry.drop_stale_reassembly(start, Duration::from_secs(5)), 0);
        assert_eq!(
            registry.drop_stale_reassembly(start + Duration::from_secs(6), Duration::from_secs(5)),
            1
        );
    }

    #[test]
    fn test_remove_drops_in_flight_fragments() {
        let now = Instant::now();
        let mut registry = PeerRegistry::new();
        let peer = record(4000, [0, 1], now);
        let owner = peer.owner_id();
        registry.add(peer);

        registry.accept_fragment(owner, 10, 2, 0, &[1], now);
        registry.remove(&owner);

        // Re-adding and completing "the same" message must not see the
        // fragment from before the removal.
        registry.add(record(4000, [0, 1], now));
        assert!(registry.accept_fragment(owner, 10, 2, 1, &[2], now).is_none());
    }
}
