//! The nine `CMSM` message-pair handlers, plus [`dispatch`] which routes
//! an inbound [`Message`] to the right one. Each handler takes the
//! sender's address, the shared [`ConsensusNode`], and the message
//! payload; none returns an error to the network -- per the
//! error-handling policy (§7 of the specification this crate
//! implements), handlers log and move on.

use blockchain_core::{PendingSignedBlock, Transaction};
use blockchain_crypto::{pubkey_from_sig, Hash256, PublicKey, Signature};
use blockchain_network::Message;
use tracing::{debug, warn};

use crate::node::ConsensusNode;

/// Routes an inbound wire [`Message`] from `addr` to its `CMSM` handler.
/// This is the `*Message.Process` dispatch from the original node: every
/// message a real transport hands the node passes through here first.
pub async fn dispatch(node: &ConsensusNode, addr: &str, msg: Message) {
    match msg {
        Message::GetBlocks { last_seq, count } => {
            handle_get_blocks(node, addr, last_seq, count).await
        }
        Message::GiveBlocks { blocks } => handle_give_blocks(node, blocks).await,
        Message::AnnounceBlocks { max_seq } => handle_announce_blocks(node, addr, max_seq).await,
        Message::GetTxns { hashes } => handle_get_txns(node, addr, hashes).await,
        Message::GiveTxns { txns } => handle_give_txns(node, txns).await,
        Message::AnnounceTxns { hashes } => handle_announce_txns(node, addr, hashes).await,
        Message::GivePendingBlock { blocks } => handle_give_pending_block(node, blocks).await,
        Message::GetTrust => handle_get_trust(node, addr).await,
        Message::GiveTrust { trust, sig } => handle_give_trust(node, trust, sig).await,
        Message::AnnounceTrust { .. } => handle_announce_trust(node, addr).await,
        Message::GetPrepare { hash } => handle_get_prepare(node, addr, hash).await,
        Message::GivePrepare { hash, sig } => handle_give_prepare(node, hash, sig).await,
        Message::AnnouncePrepare { hash, sig } => {
            handle_announce_prepare(node, addr, hash, sig).await
        }
        Message::GetAgreeNum => handle_get_agree_num(node, addr).await,
        Message::GiveAgreeNum { n, sig } => handle_give_agree_num(node, n, sig).await,
    }
}

/// `GetBlocksMessage.Process`: record the peer's reported height, reply
/// with whatever we have strictly above it, up to `count`.
/// `count == 0` is "respond with nothing", never "unlimited" -- the
/// source leaves this unstated (see `ChainStore::get_signed_blocks_since`).
pub async fn handle_get_blocks(node: &ConsensusNode, addr: &str, last_seq: u64, count: u64) {
    if node.config.disable_networking {
        return;
    }
    node.record_blockchain_height(addr, last_seq);

    let blocks = match node.get_signed_blocks_since(last_seq, count).await {
        Ok(blocks) => blocks,
        Err(e) => {
            debug!(%e, "get_signed_blocks_since failed");
            return;
        }
    };
    if blocks.is_empty() {
        return;
    }

    debug!(count = blocks.len(), last_seq, "answering GetBlocks");
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GiveBlocks { blocks })
        .await
    {
        warn!(%addr, %e, "send GiveBlocks failed");
    }
}

/// `GiveBlocksMessage.Process`: apply blocks in order, stopping at the
/// first failure since blocks are order-dependent. If at least one
/// applied, re-announce our new head *and* immediately re-request the
/// next window in the same handler -- a liveness optimization the
/// original performs beyond just waiting for the next timer tick.
pub async fn handle_give_blocks(node: &ConsensusNode, blocks: Vec<blockchain_core::SignedBlock>) {
    if node.config.disable_networking {
        return;
    }

    let mut head = match node.head_bk_seq().await {
        Ok(seq) => seq,
        Err(e) => {
            warn!(%e, "head_bk_seq failed");
            return;
        }
    };

    let mut processed = 0usize;
    for sb in blocks {
        if sb.seq() <= head {
            continue;
        }
        match node.execute_signed_block(sb.clone()).await {
            Ok(()) => {
                head = sb.seq();
                processed += 1;
            }
            Err(e) => {
                warn!(seq = sb.seq(), %e, "failed to execute received block");
                break;
            }
        }
    }

    if processed == 0 {
        return;
    }

    node.pool
        .broadcast_message(Message::AnnounceBlocks { max_seq: head })
        .await;
    node.pool
        .broadcast_message(Message::GetBlocks {
            last_seq: head,
            count: node.config.blocks_response_count,
        })
        .await;
}

/// `AnnounceBlocksMessage.Process`: if we're behind, pull from the
/// announcer.
pub async fn handle_announce_blocks(node: &ConsensusNode, addr: &str, max_seq: u64) {
    if node.config.disable_networking {
        return;
    }
    let head = match node.head_bk_seq().await {
        Ok(seq) => seq,
        Err(_) => return,
    };
    if head >= max_seq {
        return;
    }
    let m = Message::GetBlocks {
        last_seq: head,
        count: node.config.blocks_response_count,
    };
    if let Err(e) = node.pool.send_message(addr, m).await {
        warn!(%addr, %e, "send GetBlocks failed");
    }
}

/// `GivePendingBlockMessage.Process`: master-only. Adds each not yet
/// committed block to the PBR, then adds its own trust key as the
/// master's validator vote and broadcasts `GivePrepare`.
pub async fn handle_give_pending_block(node: &ConsensusNode, blocks: Vec<PendingSignedBlock>) {
    if node.config.disable_networking {
        debug!("networking disabled, ignoring GivePendingBlock");
        return;
    }
    if !node.chain.is_master() {
        return;
    }

    let head = match node.head_bk_seq().await {
        Ok(seq) => seq,
        Err(_) => return,
    };

    for pending in blocks {
        if pending.seq() <= head || !pending.pending {
            continue;
        }
        let sb = pending.into_signed_block();
        let hash = match node.pbr.add_signed_block(sb, crate::pbr::now_secs()) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%e, "failed to add pending block");
                break;
            }
        };

        let trust_pubkey = node.chain.blockchain_trust_pubkey();
        if let Err(e) = node.pbr.add_validator(hash, trust_pubkey) {
            warn!(%e, "AddValidator for our own trust key failed");
        }
        let trust_seckey = node.chain.blockchain_trust_seckey();
        let sig = trust_seckey.sign_hash(&hash);
        node.pool
            .broadcast_message(Message::GivePrepare { hash, sig })
            .await;
    }
}

/// `GetPrepareMessage.Process`: master replies with a fresh prepare
/// signature iff the hash is either still pending or already committed.
/// Both checks are kept -- either makes the reply correct.
pub async fn handle_get_prepare(node: &ConsensusNode, addr: &str, hash: Hash256) {
    if node.config.disable_networking || !node.chain.is_master() {
        return;
    }

    let pending = node.pbr.get_signed_block(hash).is_ok();
    let committed = node.chain.check_hash_exists_in_chain(hash);
    if !pending && !committed {
        return;
    }

    let trust_seckey = node.chain.blockchain_trust_seckey();
    let sig = trust_seckey.sign_hash(&hash);
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GivePrepare { hash, sig })
        .await
    {
        warn!(%addr, %e, "send GivePrepare failed");
    }
}

/// `GivePrepareMessage.Process`: recover the signer, and only for a
/// trust pubkey do we add it as a validator, check the commit gate, and
/// (if master) rebroadcast `AnnouncePrepare`. An untrusted signer
/// produces neither a validator addition nor any rebroadcast -- see the
/// "untrusted signer" boundary behaviour this implements.
pub async fn handle_give_prepare(node: &ConsensusNode, hash: Hash256, sig: Signature) {
    if node.config.disable_networking {
        return;
    }

    let pubkey = match pubkey_from_sig(&sig, &hash) {
        Ok(pk) => pk,
        Err(e) => {
            warn!(%e, "GivePrepare: signature recovery failed");
            return;
        }
    };

    if !node.trust.is_trust_pubkey(&pubkey) {
        return;
    }

    match node.pbr.add_validator(hash, pubkey) {
        Ok(()) => {}
        Err(e) => {
            // Absent: the block hasn't reached our PBR yet -- the
            // periodic RequestPrepare tick will retry; no buffering.
            // Duplicate: we've already counted this validator.
            debug!(%hash, %e, "AddValidator skipped");
            return;
        }
    }

    if let Err(e) = node.can_make_block(hash).await {
        warn!(%hash, %e, "can_make_block failed");
    }

    if node.chain.is_master() {
        let trust_seckey = node.chain.blockchain_trust_seckey();
        let announce_sig = trust_seckey.sign_hash(&hash);
        node.pool
            .broadcast_message(Message::AnnouncePrepare {
                hash,
                sig: announce_sig,
            })
            .await;
    }
}

/// `AnnouncePrepareMessage.Process`: if the hash is pending and the
/// announcer's recovered key isn't already a recorded validator, pull
/// the full signed prepare from them.
pub async fn handle_announce_prepare(node: &ConsensusNode, addr: &str, hash: Hash256, sig: Signature) {
    if node.config.disable_networking {
        return;
    }
    let pubkey = match pubkey_from_sig(&sig, &hash) {
        Ok(pk) => pk,
        Err(e) => {
            warn!(%e, "AnnouncePrepare: signature recovery failed");
            return;
        }
    };

    if node.pbr.get_signed_block(hash).is_ok() && !node.pbr.check_pubkey_exists(hash, &pubkey) {
        if let Err(e) = node
            .pool
            .send_message(addr, Message::GetPrepare { hash })
            .await
        {
            warn!(%addr, %e, "send GetPrepare failed");
        }
    }
}

/// `GetTrustMessage.Process`: only the genesis node answers.
pub async fn handle_get_trust(node: &ConsensusNode, addr: &str) {
    if node.config.disable_networking || !node.chain.is_genesis_node() {
        return;
    }
    let trust = node.trust.trust_nodes();
    let genesis_seckey = node.chain.blockchain_seckey();
    let sig = genesis_seckey.sign_hash(&crate::trust::pubkeys_arr_hash(&trust));
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GiveTrust { trust, sig })
        .await
    {
        warn!(%addr, %e, "send GiveTrust failed");
    }
}

/// `GiveTrustMessage.Process`: verified against the genesis public key
/// regardless of who is processing it -- any node can adopt an
/// unforgeable genesis-signed trust-set assertion. On success, echoes
/// `AnnounceTrust` onward.
pub async fn handle_give_trust(node: &ConsensusNode, trust: Vec<PublicKey>, sig: Signature) {
    if node.config.disable_networking || trust.is_empty() {
        return;
    }
    if node.trust.insert_trust_pubkey_list(trust.clone(), &sig) {
        debug!(count = trust.len(), "adopted trust set");
        node.pool
            .broadcast_message(Message::AnnounceTrust { trust })
            .await;
    }
}

/// `AnnounceTrustMessage.Process`: pull the full signed set.
pub async fn handle_announce_trust(node: &ConsensusNode, addr: &str) {
    if node.config.disable_networking {
        return;
    }
    if let Err(e) = node.pool.send_message(addr, Message::GetTrust).await {
        warn!(%addr, %e, "send GetTrust failed");
    }
}

/// `GetAgreeNumMessage.Process`: only the genesis node answers.
pub async fn handle_get_agree_num(node: &ConsensusNode, addr: &str) {
    if node.config.disable_networking || !node.chain.is_genesis_node() {
        return;
    }
    let n = node.trust.get_agree_node_num();
    let genesis_seckey = node.chain.blockchain_seckey();
    let sig = genesis_seckey.sign_hash(&blockchain_crypto::ascii_decimal_hash(n));
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GiveAgreeNum { n, sig })
        .await
    {
        warn!(%addr, %e, "send GiveAgreeNum failed");
    }
}

/// `GiveAgreeNumMessage.Process`: verified against the genesis key;
/// unlike trust-set adoption there is no onward announce -- the message
/// catalog has no `AnnounceAgreeNum` push.
pub async fn handle_give_agree_num(node: &ConsensusNode, n: u64, sig: Signature) {
    if node.config.disable_networking || n == 0 {
        return;
    }
    if node.trust.insert_agree_node_num(n, &sig) {
        debug!(n, "adopted agreement threshold");
    }
}

/// `AnnounceTxnsMessage.Process`: request whatever we don't already have.
pub async fn handle_announce_txns(node: &ConsensusNode, addr: &str, hashes: Vec<Hash256>) {
    if node.config.disable_networking {
        return;
    }
    let unknown = match node.filter_known(hashes).await {
        Ok(unknown) => unknown,
        Err(_) => return,
    };
    if unknown.is_empty() {
        return;
    }
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GetTxns { hashes: unknown })
        .await
    {
        warn!(%addr, %e, "send GetTxns failed");
    }
}

/// `GetTxnsMessage.Process`: reply with whichever requested hashes we
/// actually hold.
pub async fn handle_get_txns(node: &ConsensusNode, addr: &str, hashes: Vec<Hash256>) {
    if node.config.disable_networking {
        return;
    }
    let known = match node.get_known(hashes).await {
        Ok(known) => known,
        Err(_) => return,
    };
    if known.is_empty() {
        return;
    }
    if let Err(e) = node
        .pool
        .send_message(addr, Message::GiveTxns { txns: known })
        .await
    {
        warn!(%addr, %e, "send GiveTxns failed");
    }
}

/// `GiveTxnsMessage.Process`: inject each transaction; only announce
/// ones that are genuinely new to us, so peers can't spam relays.
pub async fn handle_give_txns(node: &ConsensusNode, txns: Vec<Transaction>) {
    if node.config.disable_networking {
        return;
    }

    let mut newly_known = Vec::new();
    for tx in txns {
        let hash = tx.hash();
        match node.inject_transaction(tx).await {
            Ok(outcome) if outcome.soft_violation.is_some() => {
                warn!(%hash, reason = ?outcome.soft_violation, "transaction soft violation");
            }
            Ok(outcome) if outcome.known => {
                warn!(%hash, "duplicate transaction");
            }
            Ok(_) => newly_known.push(hash),
            Err(e) => {
                warn!(%hash, %e, "failed to record transaction");
            }
        }
    }

    if !newly_known.is_empty() {
        debug!(count = newly_known.len(), "announcing new transactions");
        node.pool
            .broadcast_message(Message::AnnounceTxns {
                hashes: newly_known,
            })
            .await;
    }
}
