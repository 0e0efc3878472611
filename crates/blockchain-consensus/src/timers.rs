//! The periodic outbound ticks that keep the gossip protocol alive
//! without waiting on an inbound message: block/trust/transaction
//! announcement and request loops, and pending-block garbage
//! collection. Each tick is an independent `tokio::time::interval`
//! spawned onto its own task, mirroring the original node's per-rate
//! `time.Ticker` goroutines.

use std::sync::Arc;

use tracing::debug;

use blockchain_network::Message;

use crate::node::ConsensusNode;
use crate::pbr::now_secs;

/// Spawns every periodic tick task and returns their `JoinHandle`s, so
/// callers can abort them together on shutdown.
pub fn spawn_all(node: Arc<ConsensusNode>) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        tokio::spawn(request_blocks_loop(node.clone())),
        tokio::spawn(announce_blocks_loop(node.clone())),
        tokio::spawn(announce_txns_loop(node.clone())),
        tokio::spawn(request_trust_loop(node.clone())),
        tokio::spawn(announce_trust_loop(node.clone())),
        tokio::spawn(request_prepare_loop(node.clone())),
        tokio::spawn(request_agree_num_loop(node.clone())),
        tokio::spawn(pbr_gc_loop(node)),
    ]
}

/// Asks every peer for whatever we're missing above our own head.
async fn request_blocks_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.blocks_request_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking {
            continue;
        }
        let head = match node.head_bk_seq().await {
            Ok(seq) => seq,
            Err(e) => {
                debug!(%e, "RequestBlocks: head_bk_seq failed");
                continue;
            }
        };
        node.pool
            .broadcast_message(Message::GetBlocks {
                last_seq: head,
                count: node.config.blocks_response_count,
            })
            .await;
    }
}

/// Tells every peer our own head, so they can pull if they're behind.
async fn announce_blocks_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.blocks_announce_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking {
            continue;
        }
        let head = match node.head_bk_seq().await {
            Ok(seq) => seq,
            Err(_) => continue,
        };
        node.pool
            .broadcast_message(Message::AnnounceBlocks { max_seq: head })
            .await;
    }
}

/// Announces every unconfirmed transaction we hold, chunked so a single
/// message never carries more than `max_txn_announce_num` hashes.
async fn announce_txns_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.txns_announce_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking {
            continue;
        }
        let hashes = node.get_all_valid_unconfirmed_tx_hashes().await;
        let hashes = match hashes {
            Ok(hashes) => hashes,
            Err(e) => {
                debug!(%e, "AnnounceAllTxns: fetch failed");
                continue;
            }
        };
        for chunk in hashes.chunks(node.config.max_txn_announce_num.max(1)) {
            node.pool
                .broadcast_message(Message::AnnounceTxns {
                    hashes: chunk.to_vec(),
                })
                .await;
        }
    }
}

/// Only non-genesis nodes need to pull the trust set; a genesis node
/// already holds it authoritatively.
async fn request_trust_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.trust_node_request_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking || node.chain.is_genesis_node() {
            continue;
        }
        node.pool.broadcast_message(Message::GetTrust).await;
    }
}

/// Only the genesis node announces -- it is the sole authority able to
/// answer `GetTrust` usefully.
async fn announce_trust_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.trust_node_announce_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking || !node.chain.is_genesis_node() {
            continue;
        }
        node.pool.broadcast_message(Message::AnnounceTrust {
            trust: node.trust.trust_nodes(),
        }).await;
    }
}

/// Re-requests a signature for whatever block is still pending. Runs on
/// a much tighter interval than the other ticks (`prepare_request_rate`,
/// 2s by default): commit latency is dominated by how fast validators
/// converge on a pending block's hash.
async fn request_prepare_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.prepare_request_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking {
            continue;
        }
        for hash in node.pbr.waiting_confirmed_block_hash() {
            node.pool
                .broadcast_message(Message::GetPrepare { hash })
                .await;
        }
    }
}

async fn request_agree_num_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.agree_num_request_rate);
    loop {
        tick.tick().await;
        if node.config.disable_networking || node.chain.is_genesis_node() {
            continue;
        }
        node.pool.broadcast_message(Message::GetAgreeNum).await;
    }
}

/// Purges a pending block that has sat without reaching threshold for
/// longer than `pbr_gc_timeout`. Without this, a validator set that
/// never reaches agreement on a bad proposal would wedge the PBR
/// forever, since it holds at most one entry at a time.
async fn pbr_gc_loop(node: Arc<ConsensusNode>) {
    let mut tick = tokio::time::interval(node.config.pbr_gc_interval);
    loop {
        tick.tick().await;
        if let Some(hash) = node
            .pbr
            .remove_unconfirm_block(now_secs(), node.config.pbr_gc_timeout.as_secs())
        {
            debug!(%hash, "pending block garbage collected");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use blockchain_core::InMemoryChainStore;
    use blockchain_crypto::SecretKey;
    use blockchain_network::{InMemoryPeerPool, Message};

    fn node(config: crate::config::ConsensusConfig) -> (Arc<ConsensusNode>, Arc<InMemoryPeerPool>, crate::strand::StrandWorker) {
        let chain = Arc::new(InMemoryChainStore::new(
            true, false, SecretKey::generate(), SecretKey::generate(), 1, 0, 1,
        ));
        let pool = Arc::new(InMemoryPeerPool::new());
        let genesis_pubkey = SecretKey::generate().public_key();
        let (node, worker) = ConsensusNode::new(config, genesis_pubkey, chain, pool.clone());
        (Arc::new(node), pool, worker)
    }

    #[tokio::test(start_paused = true)]
    async fn request_blocks_loop_broadcasts_on_schedule() {
        let mut config = crate::config::ConsensusConfig::default();
        config.blocks_request_rate = Duration::from_millis(10);
        let (node, pool, worker) = node(config);
        tokio::spawn(worker.run());
        let mut rx = pool.connect("peer");

        let handle = tokio::spawn(request_blocks_loop(node));
        tokio::time::advance(Duration::from_millis(15)).await;

        assert!(matches!(rx.recv().await, Some(Message::GetBlocks { .. })));
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn pbr_gc_loop_ticks_without_disturbing_a_fresh_pending_block() {
        // `created_at`/`now_secs()` are real wall-clock reads that
        // `tokio::time::pause` does not control (see pbr.rs's own
        // `gc_purges_only_after_timeout` for the timeout logic itself);
        // this only exercises that the loop runs on schedule and leaves
        // a just-proposed block alone.
        let mut config = crate::config::ConsensusConfig::default();
        config.pbr_gc_interval = Duration::from_millis(10);
        let (node, _pool, worker) = node(config);
        tokio::spawn(worker.run());

        let hash = node.propose_block().await.unwrap();
        let handle = tokio::spawn(pbr_gc_loop(node.clone()));
        tokio::time::advance(Duration::from_millis(25)).await;
        handle.abort();

        assert!(node.pbr.get_signed_block(hash).is_ok());
    }
}
