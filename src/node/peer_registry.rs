use std::collections::BTreeMap;

use tracing::debug;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerInfo {
    pub peer_id: String,
    pub host: String,
    pub port: u16,
    pub active: bool,
    pub last_seen_ms: u64,
}

/// Outcome of recording a sighting of a peer, so the engine can decide which
/// event (if any) to emit.
#[derive(Debug, Eq, PartialEq)]
pub enum TouchOutcome {
    Unknown,
    Refreshed,
    /// was marked inactive and came back
    Reactivated,
}

/// All peers this node has ever heard of, keyed by peer id. Peers are never
/// removed, only flagged inactive after prolonged silence.
///
/// The map is ordered: `find_by_address` resolves the first match in key
/// order, which matters when two ids temporarily share an address (a rumor
/// origin registered under its forwarder's address).
pub struct PeerRegistry {
    self_id: String,
    peers: BTreeMap<String, PeerInfo>,
}

impl PeerRegistry {
    pub fn new(self_id: impl Into<String>) -> PeerRegistry {
        PeerRegistry {
            self_id: self_id.into(),
            peers: BTreeMap::new(),
        }
    }

    /// Registers a peer, replacing any previous entry for the id with a fresh
    /// active one. Refuses the node's own id. Returns whether an entry was
    /// written.
    pub fn add(&mut self, peer_id: &str, host: &str, port: u16, now_ms: u64) -> bool {
        if peer_id == self.self_id {
            return false;
        }

        self.peers.insert(peer_id.to_string(), PeerInfo {
            peer_id: peer_id.to_string(),
            host: host.to_string(),
            port,
            active: true,
            last_seen_ms: now_ms,
        });
        true
    }

    pub fn touch(&mut self, peer_id: &str, now_ms: u64) -> TouchOutcome {
        match self.peers.get_mut(peer_id) {
            None => TouchOutcome::Unknown,
            Some(peer) => {
                peer.last_seen_ms = now_ms;
                if peer.active {
                    TouchOutcome::Refreshed
                } else {
                    peer.active = true;
                    TouchOutcome::Reactivated
                }
            }
        }
    }

    /// Flags peers silent for longer than `timeout_ms` as inactive and
    /// returns their ids.
    pub fn sweep(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<String> {
        let mut timed_out = Vec::new();
        for peer in self.peers.values_mut() {
            if peer.active && now_ms.saturating_sub(peer.last_seen_ms) > timeout_ms {
                debug!("peer {} timed out", peer.peer_id);
                peer.active = false;
                timed_out.push(peer.peer_id.clone());
            }
        }
        timed_out
    }

    pub fn find_by_address(&self, host: &str, port: u16) -> Option<&str> {
        self.peers.values()
            .find(|p| p.host == host && p.port == port)
            .map(|p| p.peer_id.as_str())
    }

    pub fn get(&self, peer_id: &str) -> Option<&PeerInfo> {
        self.peers.get(peer_id)
    }

    pub fn contains(&self, peer_id: &str) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// All known peer ids, deliberately *not* filtered by liveness: hiding
    /// manually seeded peers that have not spoken yet would make them vanish
    /// from peer listings.
    pub fn active_peers(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    /// Peers currently flagged active, for gossip partner selection.
    pub fn live_peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values().filter(|p| p.active)
    }

    pub fn all_peers(&self) -> impl Iterator<Item = &PeerInfo> {
        self.peers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn registry_with_peer(last_seen_ms: u64) -> PeerRegistry {
        let mut registry = PeerRegistry::new("Node9001");
        registry.add("Node9002", "127.0.0.1", 9002, last_seen_ms);
        registry
    }

    #[test]
    fn test_add_refuses_self() {
        let mut registry = PeerRegistry::new("Node9001");
        assert!(!registry.add("Node9001", "127.0.0.1", 9001, 0));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_replaces_existing_entry() {
        let mut registry = registry_with_peer(100);
        registry.sweep(100_000, 15_000);
        assert!(!registry.get("Node9002").unwrap().active);

        assert!(registry.add("Node9002", "127.0.0.1", 9022, 200_000));
        let peer = registry.get("Node9002").unwrap();
        assert_eq!(peer.port, 9022);
        assert!(peer.active);
        assert_eq!(peer.last_seen_ms, 200_000);
    }

    #[test]
    fn test_touch_transitions() {
        let mut registry = registry_with_peer(100);
        assert_eq!(registry.touch("Node9003", 200), TouchOutcome::Unknown);
        assert_eq!(registry.touch("Node9002", 200), TouchOutcome::Refreshed);

        registry.sweep(100_000, 15_000);
        assert_eq!(registry.touch("Node9002", 100_001), TouchOutcome::Reactivated);
        assert!(registry.get("Node9002").unwrap().active);
        assert_eq!(registry.touch("Node9002", 100_002), TouchOutcome::Refreshed);
    }

    #[test]
    fn test_sweep_marks_silent_peers_inactive() {
        let mut registry = registry_with_peer(0);
        registry.add("Node9003", "127.0.0.1", 9003, 10_000);

        assert_eq!(registry.sweep(15_000, 15_000), Vec::<String>::new());
        assert_eq!(registry.sweep(15_001, 15_000), vec!["Node9002".to_string()]);
        // already inactive - not reported twice
        assert_eq!(registry.sweep(40_000, 15_000), vec!["Node9003".to_string()]);
    }

    #[test]
    fn test_find_by_address() {
        let registry = registry_with_peer(0);
        assert_eq!(registry.find_by_address("127.0.0.1", 9002), Some("Node9002"));
        assert_eq!(registry.find_by_address("127.0.0.1", 9999), None);
        assert_eq!(registry.find_by_address("10.0.0.1", 9002), None);
    }

    #[test]
    fn test_find_by_address_first_match_in_key_order() {
        let mut registry = PeerRegistry::new("Node9001");
        registry.add("ZZZ", "127.0.0.1", 9002, 0);
        registry.add("AAA", "127.0.0.1", 9002, 0);
        assert_eq!(registry.find_by_address("127.0.0.1", 9002), Some("AAA"));
    }

    #[test]
    fn test_active_peers_includes_inactive() {
        let mut registry = registry_with_peer(0);
        registry.sweep(100_000, 15_000);
        assert_eq!(registry.active_peers(), vec!["Node9002".to_string()]);
        assert_eq!(registry.live_peers().count(), 0);
    }
}
