use std::collections::HashMap;
use std::sync::Mutex;

use blockchain_crypto::{Hash256, PublicKey, SecretKey};

use crate::block::{Block, SignedBlock};
use crate::error::{CoreError, Result};
use crate::transaction::Transaction;

/// The outcome of injecting a transaction into the unconfirmed pool,
/// mirroring `InjectTransaction`'s `(known, soft_err, err)` triple from
/// the original node: a hard failure is an `Err`, a soft failure is
/// reported here without rejecting the transaction outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectOutcome {
    pub known: bool,
    pub soft_violation: Option<String>,
}

/// The narrow interface the consensus core requires of the surrounding
/// blockchain store. Block persistence, the chain head, and the
/// unconfirmed transaction pool are owned by whatever implements this
/// trait; the core only ever calls through it.
///
/// Every implementation is expected to be called exclusively through the
/// serialization strand (see `blockchain_consensus::strand`); none of
/// these methods does its own cross-call locking beyond what is needed
/// for a single call to observe a consistent snapshot.
pub trait ChainStore: Send + Sync {
    /// The sequence number of the most recently committed block.
    fn head_seq(&self) -> u64;

    fn get_block(&self, seq: u64) -> Option<SignedBlock>;

    fn get_block_by_hash(&self, hash: Hash256) -> Option<SignedBlock>;

    /// Blocks strictly above `seq`, at most `count`. `count == 0` is
    /// treated as "respond with nothing", not "unlimited" -- the
    /// original does not say either way, so implementers should not
    /// guess unlimited.
    fn get_signed_blocks_since(&self, seq: u64, count: u64) -> Vec<SignedBlock>;

    /// Applies a block to the chain. Fails with `OutOfOrder` unless
    /// `sb.seq()` strictly exceeds `head_seq()`.
    fn execute_signed_block(&self, sb: SignedBlock) -> Result<()>;

    /// Builds a block proposal from the current unconfirmed pool and
    /// signs it with `trust_seckey`. Master nodes only; callers are
    /// expected to have checked `is_master()` first. Despite the name
    /// (kept from the original `CreateAndExecuteBlock`), this does
    /// *not* commit the block -- it only assembles and signs it. The
    /// block becomes part of the chain only once it reaches the
    /// agreement threshold and `execute_signed_block` is called.
    fn create_and_execute_block(&self, trust_seckey: &SecretKey) -> Result<SignedBlock>;

    fn check_hash_exists_in_chain(&self, hash: Hash256) -> bool {
        self.get_block_by_hash(hash).is_some()
    }

    fn inject_transaction(&self, tx: Transaction) -> Result<InjectOutcome>;

    fn inject_transaction_strict(&self, tx: Transaction) -> Result<()> {
        let outcome = self.inject_transaction(tx)?;
        match outcome.soft_violation {
            Some(reason) => Err(CoreError::SoftConstraint(reason)),
            None => Ok(()),
        }
    }

    fn get_all_unconfirmed_txns(&self) -> Vec<Transaction>;

    fn get_all_valid_unconfirmed_tx_hashes(&self) -> Vec<Hash256>;

    /// The subset of `hashes` this store does not already hold.
    fn filter_known(&self, hashes: &[Hash256]) -> Vec<Hash256>;

    /// The transactions among `hashes` this store does hold.
    fn get_known(&self, hashes: &[Hash256]) -> Vec<Transaction>;

    fn set_announced(&self, hash: Hash256, when: u64);

    /// Re-checks unconfirmed transactions against current chain state,
    /// returning those that newly became valid.
    fn refresh_unconfirmed(&self) -> Vec<Hash256>;

    /// Drops unconfirmed transactions that are now provably invalid,
    /// returning their hashes.
    fn remove_invalid_unconfirmed(&self) -> Vec<Hash256>;

    fn is_master(&self) -> bool;

    fn is_genesis_node(&self) -> bool;

    fn blockchain_pubkey(&self) -> PublicKey;

    fn blockchain_seckey(&self) -> SecretKey;

    /// The key pair used for consensus (prepare) signing, distinct from
    /// any wallet/identity key a node might separately hold.
    fn blockchain_trust_pubkey(&self) -> PublicKey;

    fn blockchain_trust_seckey(&self) -> SecretKey;

    /// Whether this node is the scheduled proposer at wall-clock second
    /// `when`. A download/gossip hint, never itself a source of
    /// consensus safety.
    fn in_turn_the_node(&self, when: u64) -> bool;
}

struct InMemoryState {
    blocks: Vec<SignedBlock>,
    by_hash: HashMap<Hash256, usize>,
    mempool: HashMap<Hash256, Transaction>,
    announced: HashMap<Hash256, u64>,
}

/// An in-memory `ChainStore`, used by tests and as the default store
/// when no persistent backend is configured.
pub struct InMemoryChainStore {
    state: Mutex<InMemoryState>,
    is_master: bool,
    is_genesis: bool,
    pubkey: PublicKey,
    seckey: SecretKey,
    trust_pubkey: PublicKey,
    trust_seckey: SecretKey,
    /// round-robin schedule: `validator_count` nodes take turns every
    /// `slot_seconds`, this node holding `node_index`.
    validator_count: u64,
    node_index: u64,
    slot_seconds: u64,
}

impl InMemoryChainStore {
    pub fn new(
        is_master: bool,
        is_genesis: bool,
        seckey: SecretKey,
        trust_seckey: SecretKey,
        validator_count: u64,
        node_index: u64,
        slot_seconds: u64,
    ) -> Self {
        let pubkey = seckey.public_key();
        let trust_pubkey = trust_seckey.public_key();
        Self {
            state: Mutex::new(InMemoryState {
                blocks: Vec::new(),
                by_hash: HashMap::new(),
                mempool: HashMap::new(),
                announced: HashMap::new(),
            }),
            is_master,
            is_genesis,
            pubkey,
            seckey,
            trust_pubkey,
            trust_seckey,
            validator_count: validator_count.max(1),
            node_index,
            slot_seconds: slot_seconds.max(1),
        }
    }
}

impl ChainStore for InMemoryChainStore {
    fn head_seq(&self) -> u64 {
        self.state.lock().unwrap().blocks.last().map_or(0, |b| b.seq())
    }

    fn get_block(&self, seq: u64) -> Option<SignedBlock> {
        let state = self.state.lock().unwrap();
        state.blocks.iter().find(|b| b.seq() == seq).cloned()
    }

    fn get_block_by_hash(&self, hash: Hash256) -> Option<SignedBlock> {
        let state = self.state.lock().unwrap();
        state.by_hash.get(&hash).map(|&idx| state.blocks[idx].clone())
    }

    fn get_signed_blocks_since(&self, seq: u64, count: u64) -> Vec<SignedBlock> {
        if count == 0 {
            return Vec::new();
        }
        let state = self.state.lock().unwrap();
        state
            .blocks
            .iter()
            .filter(|b| b.seq() > seq)
            .take(count as usize)
            .cloned()
            .collect()
    }

    fn execute_signed_block(&self, sb: SignedBlock) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let head = state.blocks.last().map_or(0, |b| b.seq());
        if sb.seq() <= head {
            return Err(CoreError::OutOfOrder { seq: sb.seq(), head });
        }
        let hash = sb.hash_header();
        for tx in &sb.block.transactions {
            state.mempool.remove(&tx.hash());
        }
        state.by_hash.insert(hash, state.blocks.len());
        state.blocks.push(sb);
        Ok(())
    }

    fn create_and_execute_block(&self, trust_seckey: &SecretKey) -> Result<SignedBlock> {
        if !self.is_master {
            return Err(CoreError::NotMaster);
        }
        let state = self.state.lock().unwrap();
        let head = state.blocks.last().map_or(0, |b| b.seq());
        let prev_hash = state.blocks.last().map_or(Hash256::zero(), |b| b.hash_header());
        let transactions: Vec<Transaction> = state.mempool.values().cloned().collect();
        let block = Block::new(prev_hash, head + 1, 0, trust_seckey.public_key(), transactions);
        let header_hash = block.header.hash();
        let signature = trust_seckey.sign_hash(&header_hash);
        Ok(SignedBlock::new(block, signature))
    }

    fn inject_transaction(&self, tx: Transaction) -> Result<InjectOutcome> {
        let mut state = self.state.lock().unwrap();
        let hash = tx.hash();
        let known = state.mempool.contains_key(&hash);
        state.mempool.insert(hash, tx);
        Ok(InjectOutcome {
            known,
            soft_violation: None,
        })
    }

    fn get_all_unconfirmed_txns(&self) -> Vec<Transaction> {
        self.state.lock().unwrap().mempool.values().cloned().collect()
    }

    fn get_all_valid_unconfirmed_tx_hashes(&self) -> Vec<Hash256> {
        self.state.lock().unwrap().mempool.keys().copied().collect()
    }

    fn filter_known(&self, hashes: &[Hash256]) -> Vec<Hash256> {
        let state = self.state.lock().unwrap();
        hashes
            .iter()
            .filter(|h| !state.mempool.contains_key(h))
            .copied()
            .collect()
    }

    fn get_known(&self, hashes: &[Hash256]) -> Vec<Transaction> {
        let state = self.state.lock().unwrap();
        hashes.iter().filter_map(|h| state.mempool.get(h).cloned()).collect()
    }

    fn set_announced(&self, hash: Hash256, when: u64) {
        self.state.lock().unwrap().announced.insert(hash, when);
    }

    fn refresh_unconfirmed(&self) -> Vec<Hash256> {
        Vec::new()
    }

    fn remove_invalid_unconfirmed(&self) -> Vec<Hash256> {
        Vec::new()
    }

    fn is_master(&self) -> bool {
        self.is_master
    }

    fn is_genesis_node(&self) -> bool {
        self.is_genesis
    }

    fn blockchain_pubkey(&self) -> PublicKey {
        self.pubkey
    }

    fn blockchain_seckey(&self) -> SecretKey {
        self.seckey.clone()
    }

    fn blockchain_trust_pubkey(&self) -> PublicKey {
        self.trust_pubkey
    }

    fn blockchain_trust_seckey(&self) -> SecretKey {
        self.trust_seckey.clone()
    }

    fn in_turn_the_node(&self, when: u64) -> bool {
        (when / self.slot_seconds) % self.validator_count == self.node_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(is_master: bool) -> InMemoryChainStore {
        InMemoryChainStore::new(
            is_master,
            false,
            SecretKey::generate(),
            SecretKey::generate(),
            1,
            0,
            1,
        )
    }

    #[test]
    fn head_seq_starts_at_zero() {
        assert_eq!(store(true).head_seq(), 0);
    }

    #[test]
    fn create_and_execute_block_does_not_commit() {
        let s = store(true);
        let sb = s.create_and_execute_block(&s.blockchain_trust_seckey()).unwrap();
        assert_eq!(sb.seq(), 1);
        assert_eq!(s.head_seq(), 0);
        s.execute_signed_block(sb).unwrap();
        assert_eq!(s.head_seq(), 1);
    }

    #[test]
    fn execute_signed_block_rejects_non_ascending_seq() {
        let s = store(true);
        let sb = s.create_and_execute_block(&s.blockchain_trust_seckey()).unwrap();
        s.execute_signed_block(sb.clone()).unwrap();
        assert!(matches!(
            s.execute_signed_block(sb),
            Err(CoreError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn get_signed_blocks_since_respects_zero_count() {
        let s = store(true);
        let sb = s.create_and_execute_block(&s.blockchain_trust_seckey()).unwrap();
        s.execute_signed_block(sb).unwrap();
        assert!(s.get_signed_blocks_since(0, 0).is_empty());
        assert_eq!(s.get_signed_blocks_since(0, 10).len(), 1);
    }

    #[test]
    fn create_and_execute_block_fails_for_non_master() {
        let s = store(false);
        assert!(matches!(
            s.create_and_execute_block(&s.blockchain_trust_seckey()),
            Err(CoreError::NotMaster)
        ));
    }

    #[test]
    fn inject_transaction_reports_known_on_second_insert() {
        let s = store(true);
        let tx = Transaction::new(b"a".to_vec());
        let first = s.inject_transaction(tx.clone()).unwrap();
        let second = s.inject_transaction(tx).unwrap();
        assert!(!first.known);
        assert!(second.known);
    }

    #[test]
    fn filter_known_excludes_mempool_hashes() {
        let s = store(true);
        let tx = Transaction::new(b"a".to_vec());
        let hash = tx.hash();
        s.inject_transaction(tx).unwrap();
        let other = Hash256::digest(b"unknown");
        let unknown = s.filter_known(&[hash, other]);
        assert_eq!(unknown, vec![other]);
    }
}
