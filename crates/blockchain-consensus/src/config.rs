use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Every tunable the consensus core exposes, mirroring `NewVisorConfig`
/// in the original node. Defaults match the original's values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Suppresses all outbound sends and all processing side effects.
    pub disable_networking: bool,

    pub blocks_request_rate: Duration,
    pub blocks_announce_rate: Duration,
    pub txns_announce_rate: Duration,
    pub trust_node_request_rate: Duration,
    pub trust_node_announce_rate: Duration,
    pub prepare_request_rate: Duration,
    pub agree_num_request_rate: Duration,
    pub blockchain_backup_rate: Duration,

    /// How many blocks to respond with to a single `GetBlocks`.
    pub blocks_response_count: u64,
    /// Max transaction-hash count per `AnnounceTxns` chunk.
    pub max_txn_announce_num: usize,

    /// How long a strand submission may wait before failing.
    pub request_deadline: Duration,
    /// Bound on the strand's internal queue.
    pub request_buffer_size: usize,

    /// How often `RemoveUnconfirmBlock` runs.
    pub pbr_gc_interval: Duration,
    /// How long a pending block may sit without reaching threshold
    /// before `RemoveUnconfirmBlock` purges it (`T_gc`).
    pub pbr_gc_timeout: Duration,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            disable_networking: false,
            blocks_request_rate: Duration::from_secs(60),
            blocks_announce_rate: Duration::from_secs(60),
            txns_announce_rate: Duration::from_secs(60),
            trust_node_request_rate: Duration::from_secs(60),
            trust_node_announce_rate: Duration::from_secs(60),
            prepare_request_rate: Duration::from_secs(2),
            agree_num_request_rate: Duration::from_secs(60),
            blockchain_backup_rate: Duration::from_secs(30),
            blocks_response_count: 20,
            max_txn_announce_num: 16,
            request_deadline: Duration::from_secs(3),
            request_buffer_size: 100,
            pbr_gc_interval: Duration::from_secs(30),
            pbr_gc_timeout: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let c = ConsensusConfig::default();
        assert_eq!(c.prepare_request_rate, Duration::from_secs(2));
        assert_eq!(c.pbr_gc_timeout, Duration::from_secs(120));
        assert_eq!(c.pbr_gc_interval, Duration::from_secs(30));
        assert_eq!(c.request_buffer_size, 100);
        assert!(!c.disable_networking);
    }
}
