use std::collections::HashSet;
use std::sync::RwLock;

use blockchain_crypto::{ascii_decimal_hash, Hash256, PublicKey, Signature};

/// Hash the concatenation of a public key list, matching the original
/// node's `pubkeysArrHash`: `SHA256(pk_0 || pk_1 || ... || pk_{n-1})`.
/// Signed by the genesis key to authenticate a `TrustSet` update.
pub fn pubkeys_arr_hash(pubkeys: &[PublicKey]) -> Hash256 {
    let bytes: Vec<[u8; 33]> = pubkeys.iter().map(|pk| pk.to_bytes()).collect();
    Hash256::digest_concat(bytes.iter().map(|b| &b[..]))
}

#[derive(Clone, Default)]
struct TrustSetState {
    ordered: Vec<PublicKey>,
    lookup: HashSet<PublicKey>,
}

impl TrustSetState {
    fn from_list(list: Vec<PublicKey>) -> Self {
        let mut ordered = Vec::with_capacity(list.len());
        let mut lookup = HashSet::with_capacity(list.len());
        for pk in list {
            if lookup.insert(pk) {
                ordered.push(pk);
            }
        }
        Self { ordered, lookup }
    }
}

/// The authenticated validator set and agreement threshold, both signed
/// by the genesis secret key. Write-rarely, read-often: membership
/// checks are the hot path (every `GivePrepare`/`AnnouncePrepare`), so
/// reads take a shared lock and are backed by a `HashSet` for O(1)
/// membership.
pub struct TrustOracle {
    genesis_pubkey: PublicKey,
    trust_set: RwLock<TrustSetState>,
    agree_num: RwLock<Option<u64>>,
}

impl TrustOracle {
    /// `genesis_pubkey` is pinned at boot and is the sole root of trust
    /// for `TrustSet`/threshold updates; there is no rotation mechanism.
    pub fn new(genesis_pubkey: PublicKey) -> Self {
        Self {
            genesis_pubkey,
            trust_set: RwLock::new(TrustSetState::default()),
            agree_num: RwLock::new(None),
        }
    }

    pub fn with_trust_set(genesis_pubkey: PublicKey, initial: Vec<PublicKey>) -> Self {
        let oracle = Self::new(genesis_pubkey);
        *oracle.trust_set.write().unwrap() = TrustSetState::from_list(initial);
        oracle
    }

    pub fn trust_nodes(&self) -> Vec<PublicKey> {
        self.trust_set.read().unwrap().ordered.clone()
    }

    pub fn is_trust_pubkey(&self, pk: &PublicKey) -> bool {
        self.trust_set.read().unwrap().lookup.contains(pk)
    }

    /// Verifies `sig` over `pubkeys_arr_hash(list)` under the genesis
    /// public key. On success, replaces the trust set atomically --
    /// there is no partial-update path. Invalid signatures are silently
    /// discarded: handlers never escalate them to callers or peers.
    pub fn insert_trust_pubkey_list(&self, list: Vec<PublicKey>, sig: &Signature) -> bool {
        let hash = pubkeys_arr_hash(&list);
        if !self.verify_genesis(&hash, sig) {
            return false;
        }
        *self.trust_set.write().unwrap() = TrustSetState::from_list(list);
        true
    }

    /// Verifies `sig` over `SHA256(ascii_decimal(n))` under the genesis
    /// public key before storing `n` as the raw agreement number.
    pub fn insert_agree_node_num(&self, n: u64, sig: &Signature) -> bool {
        let hash = ascii_decimal_hash(n);
        if !self.verify_genesis(&hash, sig) {
            return false;
        }
        *self.agree_num.write().unwrap() = Some(n);
        true
    }

    /// The effective commit threshold: the stored agreement number
    /// clamped into `[1, |TrustSet|]`, defaulting to `|TrustSet|`
    /// (unanimity) if none has been received yet.
    pub fn get_agree_node_num(&self) -> u64 {
        let trust_count = self.trust_set.read().unwrap().ordered.len() as u64;
        let trust_count = trust_count.max(1);
        match *self.agree_num.read().unwrap() {
            Some(n) if n >= 1 && n <= trust_count => n,
            _ => trust_count,
        }
    }

    fn verify_genesis(&self, hash: &Hash256, sig: &Signature) -> bool {
        blockchain_crypto::pubkey_from_sig(sig, hash)
            .map(|recovered| recovered == self.genesis_pubkey)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockchain_crypto::SecretKey;

    #[test]
    fn insert_trust_set_requires_genesis_signature() {
        let genesis = SecretKey::generate();
        let oracle = TrustOracle::new(genesis.public_key());
        let list = vec![SecretKey::generate().public_key()];
        let hash = pubkeys_arr_hash(&list);

        let bad_sig = SecretKey::generate().sign_hash(&hash);
        assert!(!oracle.insert_trust_pubkey_list(list.clone(), &bad_sig));
        assert!(oracle.trust_nodes().is_empty());

        let good_sig = genesis.sign_hash(&hash);
        assert!(oracle.insert_trust_pubkey_list(list.clone(), &good_sig));
        assert_eq!(oracle.trust_nodes(), list);
    }

    #[test]
    fn trust_set_update_is_a_full_replace_and_dedups() {
        let genesis = SecretKey::generate();
        let oracle = TrustOracle::new(genesis.public_key());
        let pk = SecretKey::generate().public_key();
        let dup_list = vec![pk, pk, SecretKey::generate().public_key()];
        let sig = genesis.sign_hash(&pubkeys_arr_hash(&dup_list));
        oracle.insert_trust_pubkey_list(dup_list, &sig);
        assert_eq!(oracle.trust_nodes().len(), 2);

        let second_list = vec![SecretKey::generate().public_key()];
        let sig2 = genesis.sign_hash(&pubkeys_arr_hash(&second_list));
        oracle.insert_trust_pubkey_list(second_list.clone(), &sig2);
        assert_eq!(oracle.trust_nodes(), second_list);
    }

    #[test]
    fn threshold_defaults_to_unanimity() {
        let genesis = SecretKey::generate();
        let list: Vec<_> = (0..3).map(|_| SecretKey::generate().public_key()).collect();
        let oracle = TrustOracle::with_trust_set(genesis.public_key(), list);
        assert_eq!(oracle.get_agree_node_num(), 3);
    }

    #[test]
    fn threshold_is_clamped_into_trust_set_bounds() {
        let genesis = SecretKey::generate();
        let list: Vec<_> = (0..2).map(|_| SecretKey::generate().public_key()).collect();
        let oracle = TrustOracle::with_trust_set(genesis.public_key(), list);

        let sig = genesis.sign_hash(&ascii_decimal_hash(5));
        assert!(oracle.insert_agree_node_num(5, &sig));
        assert_eq!(oracle.get_agree_node_num(), 2);

        let sig0 = genesis.sign_hash(&ascii_decimal_hash(0));
        assert!(oracle.insert_agree_node_num(0, &sig0));
        assert_eq!(oracle.get_agree_node_num(), 2);
    }

    #[test]
    fn invalid_agree_num_signature_is_discarded() {
        let genesis = SecretKey::generate();
        let oracle = TrustOracle::new(genesis.public_key());
        let sig = SecretKey::generate().sign_hash(&ascii_decimal_hash(7));
        assert!(!oracle.insert_agree_node_num(7, &sig));
        assert_eq!(oracle.get_agree_node_num(), 1);
    }
}
