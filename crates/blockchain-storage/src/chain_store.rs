use std::sync::Mutex;

use blockchain_core::{Block, ChainStore, CoreError, InjectOutcome, Result, SignedBlock, Transaction};
use blockchain_crypto::{Hash256, PublicKey, SecretKey};

use crate::errors::StorageError;

fn seq_key(seq: u64) -> [u8; 8] {
    seq.to_be_bytes()
}

fn decode_seq(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

fn decode_block(bytes: &[u8]) -> std::result::Result<SignedBlock, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

fn decode_tx(bytes: &[u8]) -> std::result::Result<Transaction, StorageError> {
    Ok(bincode::deserialize(bytes)?)
}

/// A `sled`-backed [`ChainStore`]. Committed blocks, the hash index, and
/// the unconfirmed transaction pool all live in the same `sled::Db`, so
/// restarting the process loses nothing the original node would have
/// kept either -- unlike the `PBR`, peer-height map, and trust set,
/// which stay process-lifetime only (see the concurrency model).
///
/// Compound operations (`execute_signed_block`, `create_and_execute_block`,
/// `inject_transaction`) take `write_lock` for their full duration: sled
/// guarantees each individual tree operation is atomic, but a
/// read-then-write sequence across trees is not, the same reason
/// `InMemoryChainStore` wraps its state in a single `Mutex`.
pub struct SledChainStore {
    blocks: sled::Tree,
    hash_index: sled::Tree,
    mempool: sled::Tree,
    announced: sled::Tree,
    write_lock: Mutex<()>,

    is_master: bool,
    is_genesis: bool,
    pubkey: PublicKey,
    seckey: SecretKey,
    trust_pubkey: PublicKey,
    trust_seckey: SecretKey,
    validator_count: u64,
    node_index: u64,
    slot_seconds: u64,
}

impl SledChainStore {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        path: &str,
        is_master: bool,
        is_genesis: bool,
        seckey: SecretKey,
        trust_seckey: SecretKey,
        validator_count: u64,
        node_index: u64,
        slot_seconds: u64,
    ) -> std::result::Result<Self, StorageError> {
        let db = sled::open(path)?;
        let pubkey = seckey.public_key();
        let trust_pubkey = trust_seckey.public_key();
        Ok(Self {
            blocks: db.open_tree("blocks")?,
            hash_index: db.open_tree("hash_index")?,
            mempool: db.open_tree("mempool")?,
            announced: db.open_tree("announced")?,
            write_lock: Mutex::new(()),
            is_master,
            is_genesis,
            pubkey,
            seckey,
            trust_pubkey,
            trust_seckey,
            validator_count: validator_count.max(1),
            node_index,
            slot_seconds: slot_seconds.max(1),
        })
    }

    fn head_seq_unlocked(&self) -> std::result::Result<u64, StorageError> {
        Ok(self.blocks.last()?.map_or(0, |(k, _)| decode_seq(&k)))
    }

    fn get_block_unlocked(&self, seq: u64) -> std::result::Result<Option<SignedBlock>, StorageError> {
        match self.blocks.get(seq_key(seq))? {
            Some(bytes) => Ok(Some(decode_block(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl ChainStore for SledChainStore {
    fn head_seq(&self) -> u64 {
        self.head_seq_unlocked().unwrap_or(0)
    }

    fn get_block(&self, seq: u64) -> Option<SignedBlock> {
        self.get_block_unlocked(seq).ok().flatten()
    }

    fn get_block_by_hash(&self, hash: Hash256) -> Option<SignedBlock> {
        let seq_bytes = self.hash_index.get(hash.to_bytes()).ok()??;
        self.get_block(decode_seq(&seq_bytes))
    }

    fn get_signed_blocks_since(&self, seq: u64, count: u64) -> Vec<SignedBlock> {
        if count == 0 {
            return Vec::new();
        }
        self.blocks
            .range(seq_key(seq + 1)..)
            .take(count as usize)
            .filter_map(|entry| entry.ok())
            .filter_map(|(_, v)| decode_block(&v).ok())
            .collect()
    }

    fn execute_signed_block(&self, sb: SignedBlock) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap();
        let head = self.head_seq_unlocked().map_err(CoreError::from)?;
        if sb.seq() <= head {
            return Err(CoreError::OutOfOrder { seq: sb.seq(), head });
        }

        let hash = sb.hash_header();
        let encoded = bincode::serialize(&sb).map_err(StorageError::from).map_err(CoreError::from)?;

        for tx in &sb.block.transactions {
            self.mempool.remove(tx.hash().to_bytes()).map_err(StorageError::from).map_err(CoreError::from)?;
        }
        self.hash_index
            .insert(hash.to_bytes(), &seq_key(sb.seq())[..])
            .map_err(StorageError::from)
            .map_err(CoreError::from)?;
        self.blocks
            .insert(seq_key(sb.seq()), encoded)
            .map_err(StorageError::from)
            .map_err(CoreError::from)?;
        Ok(())
    }

    fn create_and_execute_block(&self, trust_seckey: &SecretKey) -> Result<SignedBlock> {
        if !self.is_master {
            return Err(CoreError::NotMaster);
        }
        let _guard = self.write_lock.lock().unwrap();
        let head = self.head_seq_unlocked().map_err(CoreError::from)?;
        let prev_hash = self
            .get_block_unlocked(head)
            .map_err(CoreError::from)?
            .map_or(Hash256::zero(), |b| b.hash_header());

        let transactions: Vec<Transaction> = self
            .mempool
            .iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|(_, v)| decode_tx(&v).ok())
            .collect();

        let block = Block::new(prev_hash, head + 1, 0, trust_seckey.public_key(), transactions);
        let header_hash = block.header.hash();
        let signature = trust_seckey.sign_hash(&header_hash);
        Ok(SignedBlock::new(block, signature))
    }

    fn inject_transaction(&self, tx: Transaction) -> Result<InjectOutcome> {
        let _guard = self.write_lock.lock().unwrap();
        let hash = tx.hash();
        let encoded = bincode::serialize(&tx).map_err(StorageError::from).map_err(CoreError::from)?;
        let known = self
            .mempool
            .insert(hash.to_bytes(), encoded)
            .map_err(StorageError::from)
            .map_err(CoreError::from)?
            .is_some();
        Ok(InjectOutcome {
            known,
            soft_violation: None,
        })
    }

    fn get_all_unconfirmed_txns(&self) -> Vec<Transaction> {
        self.mempool
            .iter()
            .filter_map(|entry| entry.ok())
            .filter_map(|(_, v)| decode_tx(&v).ok())
            .collect()
    }

    fn get_all_valid_unconfirmed_tx_hashes(&self) -> Vec<Hash256> {
        self.mempool
            .iter()
            .keys()
            .filter_map(|k| k.ok())
            .filter_map(|k| Hash256::from_slice(&k).ok())
            .collect()
    }

    fn filter_known(&self, hashes: &[Hash256]) -> Vec<Hash256> {
        hashes
            .iter()
            .filter(|h| !matches!(self.mempool.contains_key(h.to_bytes()), Ok(true)))
            .copied()
            .collect()
    }

    fn get_known(&self, hashes: &[Hash256]) -> Vec<Transaction> {
        hashes
            .iter()
            .filter_map(|h| self.mempool.get(h.to_bytes()).ok().flatten())
            .filter_map(|v| decode_tx(&v).ok())
            .collect()
    }

    fn set_announced(&self, hash: Hash256, when: u64) {
        let _ = self.announced.insert(hash.to_bytes(), &when.to_be_bytes()[..]);
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
