use serde::{Deserialize, Serialize};

use blockchain_core::{PendingSignedBlock, SignedBlock, Transaction};
use blockchain_crypto::{Hash256, PublicKey, Signature};

/// The wire protocol the consensus core speaks to its peers.
///
/// Each variant is a type-tagged record; field ordering and types are
/// part of the interoperability contract. Messages carry no explicit
/// version, matching the original node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Request blocks strictly above `last_seq`, at most `count`.
    GetBlocks { last_seq: u64, count: u64 },
    /// Response to `GetBlocks`, or an unsolicited push.
    GiveBlocks { blocks: Vec<SignedBlock> },
    /// Tells a peer our highest known sequence number.
    AnnounceBlocks { max_seq: u64 },

    GetTxns { hashes: Vec<Hash256> },
    GiveTxns { txns: Vec<Transaction> },
    AnnounceTxns { hashes: Vec<Hash256> },

    /// A proposer pushing a not-yet-committed block to the master.
    GivePendingBlock { blocks: Vec<PendingSignedBlock> },

    GetTrust,
    /// Signed over `SHA256(concat(pk_bytes))` by the genesis key.
    GiveTrust { trust: Vec<PublicKey>, sig: Signature },
    AnnounceTrust { trust: Vec<PublicKey> },

    GetPrepare { hash: Hash256 },
    /// Signed over `hash` -- a vote to commit.
    GivePrepare { hash: Hash256, sig: Signature },
    AnnouncePrepare { hash: Hash256, sig: Signature },

    GetAgreeNum,
    /// Signed over `SHA256(ascii_decimal(n))` by the genesis key.
    GiveAgreeNum { n: u64, sig: Signature },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_bincode() {
        let m = Message::AnnounceBlocks { max_seq: 42 };
        let bytes = bincode::serialize(&m).unwrap();
        let back: Message = bincode::deserialize(&bytes).unwrap();
        assert!(matches!(back, Message::AnnounceBlocks { max_seq: 42 }));
    }
}
