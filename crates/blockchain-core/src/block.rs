use serde::{Deserialize, Serialize};

use blockchain_crypto::{Hash256, PublicKey, Signature};

use crate::transaction::Transaction;

/// Compute the merkle root of a transaction set's hashes, carrying an odd
/// trailing node forward to the next level unchanged.
pub fn merkle_root(transactions: &[Transaction]) -> Hash256 {
    if transactions.is_empty() {
        return Hash256::zero();
    }

    let mut level: Vec<Hash256> = transactions.iter().map(|tx| tx.hash()).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(Hash256::digest_concat([pair[0].as_ref(), pair[1].as_ref()]));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

/// A block header. No `difficulty`/`nonce` fields: this is permissioned
/// PBFT, not proof-of-work, so the block commits by validator signature
/// count rather than by work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub prev_hash: Hash256,
    pub seq: u64,
    pub timestamp: u64,
    pub tx_merkle_root: Hash256,
    /// The proposer's claimed identity. Purely advisory -- the core
    /// never trusts this field for authentication; it recovers the
    /// actual signer from the block's signature (see `pubkey_from_sig`).
    pub creator: PublicKey,
}

impl BlockHeader {
    /// The canonical content hash used throughout the consensus core as
    /// the block's identity: `PBR` keys pending entries by it, and
    /// `GivePrepare`/`AnnouncePrepare` sign over it.
    pub fn hash(&self) -> Hash256 {
        let encoded = bincode::serialize(self).expect("BlockHeader is always serializable");
        Hash256::digest(&encoded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(
        prev_hash: Hash256,
        seq: u64,
        timestamp: u64,
        creator: PublicKey,
        transactions: Vec<Transaction>,
    ) -> Self {
        let tx_merkle_root = merkle_root(&transactions);
        Self {
            header: BlockHeader {
                prev_hash,
                seq,
                timestamp,
                tx_merkle_root,
                creator,
            },
            transactions,
        }
    }
}

/// A block body plus its creator's signature over the header hash.
///
/// The signature is the sole authentication primitive: the signer's
/// public key is recovered from it (`pubkey_from_sig`), never trusted
/// from an attached field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub block: Block,
    pub signature: Signature,
}

impl SignedBlock {
    pub fn new(block: Block, signature: Signature) -> Self {
        Self { block, signature }
    }

    /// The canonical hash PBR and the prepare exchange key off of.
    pub fn hash_header(&self) -> Hash256 {
        self.block.header.hash()
    }

    pub fn seq(&self) -> u64 {
        self.block.header.seq
    }
}

/// A signed block that has not yet been committed to the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignedBlock {
    pub signed: SignedBlock,
    pub pending: bool,
}

impl PendingSignedBlock {
    pub fn new(signed: SignedBlock) -> Self {
        Self {
            signed,
            pending: true,
        }
    }

    pub fn seq(&self) -> u64 {
        self.signed.seq()
    }

    pub fn into_signed_block(self) -> SignedBlock {
        self.signed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_crypto::SecretKey;

    fn sample_block(seq: u64) -> Block {
        let creator = SecretKey::generate().public_key();
        Block::new(
            Hash256::zero(),
            seq,
            0,
            creator,
            vec![Transaction::new(b"tx".to_vec())],
        )
    }

    #[test]
    fn header_hash_is_stable_for_same_content() {
        let block = sample_block(1);
        assert_eq!(block.header.hash(), block.header.hash());
    }

    #[test]
    fn different_seq_changes_header_hash() {
        let a = sample_block(1);
        let b = sample_block(2);
        assert_ne!(a.header.hash(), b.header.hash());
    }

    #[test]
    fn merkle_root_of_empty_transactions_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::zero());
    }

    #[test]
    fn merkle_root_carries_odd_node_forward() {
        let txs = vec![
            Transaction::new(b"a".to_vec()),
            Transaction::new(b"b".to_vec()),
            Transaction::new(b"c".to_vec()),
        ];
        let root = merkle_root(&txs);
        // Recomputing by hand: level0 = [h(a), h(b), h(c)]
        // level1 = [H(h(a)||h(b)), h(c)]
        // level2 = [H(level1[0] || level1[1])]
        let h = |t: &Transaction| t.hash();
        let l1_0 = Hash256::digest_concat([h(&txs[0]).as_ref(), h(&txs[1]).as_ref()]);
        let l1_1 = h(&txs[2]);
        let expected = Hash256::digest_concat([l1_0.as_ref(), l1_1.as_ref()]);
        assert_eq!(root, expected);
    }

    #[test]
    fn signed_block_hash_header_matches_block_header_hash() {
        let block = sample_block(1);
        let header_hash = block.header.hash();
        let sk = SecretKey::generate();
        let sig = sk.sign_hash(&header_hash);
        let sb = SignedBlock::new(block, sig);
        assert_eq!(sb.hash_header(), header_hash);
        assert_eq!(sb.seq(), 1);
    }
}
