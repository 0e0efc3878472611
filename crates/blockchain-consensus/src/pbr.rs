use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use blockchain_core::SignedBlock;
use blockchain_crypto::{pubkey_from_sig, Hash256, PublicKey};

use crate::error::{ConsensusError, Result};

/// Current wall-clock time in whole seconds, used as `created_at` at
/// insertion and compared against on every GC pass.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs()
}

/// A single in-flight proposed block, owned exclusively by the PBR.
#[derive(Debug, Clone)]
pub struct PendingBlockEntry {
    pub block: SignedBlock,
    /// Distinct public keys that have voted to commit this block. The
    /// creator's recovered key is always `validators[0]`.
    pub validators: Vec<PublicKey>,
    pub created_at: u64,
}

impl PendingBlockEntry {
    fn hash(&self) -> Hash256 {
        self.block.hash_header()
    }
}

/// Holds at most one in-flight proposed block at a time, together with
/// its accumulated validator signatures and insertion time.
///
/// Modeled as `Option<PendingBlockEntry>` rather than a map keyed by
/// hash: the protocol assumes a single proposer at a time, and two
/// concurrent pending blocks at the same sequence would require fork
/// choice that this implementation does not support (no view-change).
/// All operations share one mutex and observe a consistent snapshot for
/// their full duration.
#[derive(Default)]
pub struct PendingBlockRegistry {
    entry: Mutex<Option<PendingBlockEntry>>,
}

impl PendingBlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `sb` as the registry's sole pending entry, recovering the
    /// creator's public key from its signature as the first validator.
    pub fn add_signed_block(&self, sb: SignedBlock, now: u64) -> Result<Hash256> {
        let hash = sb.hash_header();
        let mut guard = self.entry.lock().unwrap();

        if let Some(existing) = guard.as_ref() {
            if existing.hash() == hash {
                return Err(ConsensusError::Duplicate(format!(
                    "block {hash} already pending"
                )));
            }
            return Err(ConsensusError::Capacity);
        }

        let creator = pubkey_from_sig(&sb.signature, &hash)
            .map_err(|e| ConsensusError::SignatureInvalid(e.to_string()))?;

        *guard = Some(PendingBlockEntry {
            block: sb,
            validators: vec![creator],
            created_at: now,
        });
        Ok(hash)
    }

    pub fn get_signed_block(&self, hash: Hash256) -> Result<SignedBlock> {
        self.with_entry(hash, |entry| entry.block.clone())
    }

    /// Fails unless `seq` strictly exceeds every currently pending
    /// block's sequence. Only compares against pending entries, not the
    /// chain head -- callers are expected to have already checked the
    /// head separately.
    pub fn check_bk_seq(&self, seq: u64) -> Result<()> {
        let guard = self.entry.lock().unwrap();
        if let Some(entry) = guard.as_ref() {
            if seq <= entry.block.seq() {
                return Err(ConsensusError::Order);
            }
        }
        Ok(())
    }

    pub fn add_validator(&self, hash: Hash256, pk: PublicKey) -> Result<()> {
        let mut guard = self.entry.lock().unwrap();
        let entry = guard
            .as_mut()
            .filter(|e| e.hash() == hash)
            .ok_or_else(|| ConsensusError::Absent(format!("block {hash} not pending")))?;

        if entry.validators.contains(&pk) {
            return Err(ConsensusError::Duplicate(format!(
                "pubkey {pk} already a validator of {hash}"
            )));
        }
        entry.validators.push(pk);
        Ok(())
    }

    pub fn check_pubkey_exists(&self, hash: Hash256, pk: &PublicKey) -> bool {
        let guard = self.entry.lock().unwrap();
        guard
            .as_ref()
            .filter(|e| e.hash() == hash)
            .is_some_and(|e| e.validators.contains(pk))
    }

    pub fn validator_number(&self, hash: Hash256) -> Result<usize> {
        self.with_entry(hash, |entry| entry.validators.len())
    }

    pub fn get_block_validators(&self, hash: Hash256) -> Result<Vec<PublicKey>> {
        self.with_entry(hash, |entry| entry.validators.clone())
    }

    pub fn delete_hash(&self, hash: Hash256) -> Result<()> {
        let mut guard = self.entry.lock().unwrap();
        if guard.as_ref().is_some_and(|e| e.hash() == hash) {
            *guard = None;
            Ok(())
        } else {
            Err(ConsensusError::Absent(format!("block {hash} not pending")))
        }
    }

    pub fn waiting_confirmed_block_hash(&self) -> Vec<Hash256> {
        self.entry
            .lock()
            .unwrap()
            .as_ref()
            .map(|e| vec![e.hash()])
            .unwrap_or_default()
    }

    /// Purges the pending entry if it has sat for more than
    /// `timeout_secs` without reaching threshold. Returns the purged
    /// hash, if any.
    pub fn remove_unconfirm_block(&self, now: u64, timeout_secs: u64) -> Option<Hash256> {
        let mut guard = self.entry.lock().unwrap();
        let expired = guard
            .as_ref()
            .is_some_and(|e| now.saturating_sub(e.created_at) > timeout_secs);
        if expired {
            guard.take().map(|e| e.hash())
        } else {
            None
        }
    }

    fn with_entry<T>(&self, hash: Hash256, f: impl FnOnce(&PendingBlockEntry) -> T) -> Result<T> {
        let guard = self.entry.lock().unwrap();
        guard
            .as_ref()
            .filter(|e| e.hash() == hash)
            .map(f)
            .ok_or_else(|| ConsensusError::Absent(format!("block {hash} not pending")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_core::Block;
    use blockchain_crypto::{Hash256 as H, SecretKey};

    fn signed(seq: u64, sk: &SecretKey) -> SignedBlock {
        let block = Block::new(H::zero(), seq, 0, sk.public_key(), vec![]);
        let sig = sk.sign_hash(&block.header.hash());
        SignedBlock::new(block, sig)
    }

    #[test]
    fn add_then_get_round_trips() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        let sb = signed(1, &sk);
        let hash = pbr.add_signed_block(sb.clone(), 1000).unwrap();
        assert_eq!(pbr.get_signed_block(hash).unwrap(), sb);
        assert_eq!(pbr.get_block_validators(hash).unwrap(), vec![sk.public_key()]);
    }

    #[test]
    fn second_concurrent_block_fails_capacity() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        pbr.add_signed_block(signed(1, &sk), 1000).unwrap();
        let other = signed(2, &SecretKey::generate());
        assert_eq!(
            pbr.add_signed_block(other, 1000).unwrap_err(),
            ConsensusError::Capacity
        );
    }

    #[test]
    fn duplicate_hash_is_rejected() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        let sb = signed(1, &sk);
        pbr.add_signed_block(sb.clone(), 1000).unwrap();
        assert!(matches!(
            pbr.add_signed_block(sb, 1000),
            Err(ConsensusError::Duplicate(_))
        ));
    }

    #[test]
    fn add_validator_rejects_duplicate_and_absent() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        let sb = signed(1, &sk);
        let hash = pbr.add_signed_block(sb, 1000).unwrap();

        let v1 = SecretKey::generate().public_key();
        pbr.add_validator(hash, v1).unwrap();
        assert_eq!(pbr.validator_number(hash).unwrap(), 2);

        assert!(matches!(
            pbr.add_validator(hash, v1),
            Err(ConsensusError::Duplicate(_))
        ));
        assert_eq!(pbr.validator_number(hash).unwrap(), 2);

        assert!(matches!(
            pbr.add_validator(Hash256::zero(), v1),
            Err(ConsensusError::Absent(_))
        ));
    }

    #[test]
    fn check_bk_seq_only_compares_against_pending() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        pbr.add_signed_block(signed(5, &sk), 1000).unwrap();
        assert!(pbr.check_bk_seq(5).is_err());
        assert!(pbr.check_bk_seq(6).is_ok());
    }

    #[test]
    fn delete_hash_empties_registry_and_is_idempotent_failure() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        let sb = signed(1, &sk);
        let hash = pbr.add_signed_block(sb, 1000).unwrap();
        pbr.delete_hash(hash).unwrap();
        assert!(pbr.waiting_confirmed_block_hash().is_empty());
        assert!(matches!(pbr.delete_hash(hash), Err(ConsensusError::Absent(_))));
    }

    #[test]
    fn gc_purges_only_after_timeout() {
        let pbr = PendingBlockRegistry::new();
        let sk = SecretKey::generate();
        let hash = pbr.add_signed_block(signed(1, &sk), 1000).unwrap();

        assert_eq!(pbr.remove_unconfirm_block(1100, 120), None);
        assert_eq!(pbr.get_signed_block(hash).unwrap().seq(), 1);

        assert_eq!(pbr.remove_unconfirm_block(1121, 120), Some(hash));
        assert!(matches!(pbr.get_signed_block(hash), Err(ConsensusError::Absent(_))));
    }
}
