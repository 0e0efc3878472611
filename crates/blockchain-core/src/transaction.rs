use serde::{Deserialize, Serialize};

use blockchain_crypto::Hash256;

/// An opaque transaction payload.
///
/// The consensus core never interprets transaction contents -- hard and
/// soft constraint checking and execution are external collaborators
/// (see the chain-store interface). A transaction only needs to be
/// hashable and serializable so it can flow through the mempool and the
/// `GiveTxns`/`AnnounceTxns` messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Content hash, used as the transaction's identity in the mempool
    /// and in `AnnounceTxns`/`GetTxns`.
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.payload)
    }
}
