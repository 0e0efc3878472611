use std::collections::HashMap;
use std::sync::Mutex;

/// Peer address -> highest block sequence that peer has announced.
///
/// A download hint only, never authoritative: it exists so
/// `EstimateBlockchainHeight` can report download progress, and is
/// populated opportunistically whenever a peer's `GetBlocks`/
/// `AnnounceBlocks` tells us what they claim to have.
///
/// Owned by the serialization strand in the same way the original
/// `Visor.blockchainHeights` map is -- every read and write here is
/// expected to happen inside a strand-submitted closure, so the
/// `Mutex` below is never contended.
#[derive(Default)]
pub struct PeerHeightMap {
    heights: Mutex<HashMap<String, u64>>,
}

impl PeerHeightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, addr: &str, seq: u64) {
        self.heights.lock().unwrap().insert(addr.to_string(), seq);
    }

    pub fn remove(&self, addr: &str) {
        self.heights.lock().unwrap().remove(addr);
    }

    /// The highest peer-reported height, or `our_seq` if fewer than two
    /// peers have reported -- matching the original's reluctance to
    /// trust a single outlier report.
    pub fn estimate(&self, our_seq: u64) -> u64 {
        let heights = self.heights.lock().unwrap();
        if heights.len() < 2 {
            return our_seq;
        }
        heights.values().copied().max().unwrap_or(our_seq)
    }

    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.heights
            .lock()
            .unwrap()
            .iter()
            .map(|(addr, seq)| (addr.clone(), *seq))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_falls_back_to_our_seq_with_fewer_than_two_peers() {
        let map = PeerHeightMap::new();
        assert_eq!(map.estimate(5), 5);
        map.record("a", 10);
        assert_eq!(map.estimate(5), 5);
    }

    #[test]
    fn estimate_takes_the_max_once_two_peers_reported() {
        let map = PeerHeightMap::new();
        map.record("a", 10);
        map.record("b", 20);
        assert_eq!(map.estimate(5), 20);
    }

    #[test]
    fn remove_drops_a_peer_from_the_snapshot() {
        let map = PeerHeightMap::new();
        map.record("a", 10);
        map.remove("a");
        assert!(map.snapshot().is_empty());
    }
}
