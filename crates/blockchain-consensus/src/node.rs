use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use blockchain_core::{
    ChainStore, CoreError, InjectOutcome, PendingSignedBlock, SignedBlock, Transaction,
};
use blockchain_crypto::{Hash256, PublicKey};
use blockchain_network::PeerPool;

use crate::config::ConsensusConfig;
use crate::error::{ConsensusError, Result};
use crate::height::PeerHeightMap;
use crate::pbr::{now_secs, PendingBlockRegistry};
use crate::strand::{Strand, StrandWorker};
use crate::trust::TrustOracle;

/// The shared context every `CMSM` handler and periodic tick operates
/// on: the `PBR`, the `TST`, a handle to the serialization strand, and
/// the chain/pool collaborators. Handlers reach these fields directly
/// rather than through accessor methods -- this type is the node's
/// internals, not a library facade.
pub struct ConsensusNode {
    pub config: ConsensusConfig,
    pub pbr: PendingBlockRegistry,
    pub trust: TrustOracle,
    pub heights: PeerHeightMap,
    pub strand: Strand,
    pub chain: Arc<dyn ChainStore>,
    pub pool: Arc<dyn PeerPool>,
}

impl ConsensusNode {
    /// `genesis_pubkey` seeds the `TrustOracle`'s pinned root of trust.
    /// It is ordinarily `chain.blockchain_pubkey()` of whichever node
    /// acts as genesis, supplied here rather than read from `chain`
    /// directly so a non-genesis node can be configured with its peers'
    /// genesis key before it has synced anything.
    pub fn new(
        config: ConsensusConfig,
        genesis_pubkey: PublicKey,
        chain: Arc<dyn ChainStore>,
        pool: Arc<dyn PeerPool>,
    ) -> (Self, StrandWorker) {
        let (strand, worker) = Strand::new(config.request_buffer_size);
        let node = Self {
            trust: TrustOracle::new(genesis_pubkey),
            pbr: PendingBlockRegistry::new(),
            heights: PeerHeightMap::new(),
            strand,
            chain,
            pool,
            config,
        };
        (node, worker)
    }

    fn deadline(&self) -> Duration {
        self.config.request_deadline
    }

    pub async fn head_bk_seq(&self) -> Result<u64> {
        let chain = self.chain.clone();
        self.strand
            .submit("HeadBkSeq", self.deadline(), move || chain.head_seq())
            .await
    }

    pub async fn get_signed_blocks_since(&self, seq: u64, count: u64) -> Result<Vec<SignedBlock>> {
        let chain = self.chain.clone();
        self.strand
            .submit("GetSignedBlocksSince", self.deadline(), move || {
                chain.get_signed_blocks_since(seq, count)
            })
            .await
    }

    pub async fn execute_signed_block(&self, sb: SignedBlock) -> Result<()> {
        let chain = self.chain.clone();
        let outcome = self
            .strand
            .submit("ExecuteSignedBlock", self.deadline(), move || {
                chain.execute_signed_block(sb)
            })
            .await?;
        outcome.map_err(|e| match e {
            CoreError::OutOfOrder { .. } => ConsensusError::Order,
            other => ConsensusError::Transport(other.to_string()),
        })
    }

    /// Builds and signs a new proposal from the unconfirmed pool. Master
    /// nodes only.
    pub async fn create_and_execute_block(&self) -> Result<SignedBlock> {
        let chain = self.chain.clone();
        self.strand
            .submit("CreateAndExecuteBlock", self.deadline(), move || {
                let trust_seckey = chain.blockchain_trust_seckey();
                chain.create_and_execute_block(&trust_seckey)
            })
            .await?
            .map_err(|e| ConsensusError::Transport(e.to_string()))
    }

    pub async fn inject_transaction(&self, tx: Transaction) -> Result<InjectOutcome> {
        let chain = self.chain.clone();
        self.strand
            .submit("InjectTransaction", self.deadline(), move || {
                chain.inject_transaction(tx)
            })
            .await?
            .map_err(|e| ConsensusError::ConstraintViolation(e.to_string()))
    }

    pub async fn filter_known(&self, hashes: Vec<Hash256>) -> Result<Vec<Hash256>> {
        let chain = self.chain.clone();
        self.strand
            .submit("FilterKnown", self.deadline(), move || {
                chain.filter_known(&hashes)
            })
            .await
    }

    pub async fn get_known(&self, hashes: Vec<Hash256>) -> Result<Vec<Transaction>> {
        let chain = self.chain.clone();
        self.strand
            .submit("GetKnown", self.deadline(), move || chain.get_known(&hashes))
            .await
    }

    pub async fn get_all_valid_unconfirmed_tx_hashes(&self) -> Result<Vec<Hash256>> {
        let chain = self.chain.clone();
        self.strand
            .submit("GetAllValidUnconfirmedTxHashes", self.deadline(), move || {
                chain.get_all_valid_unconfirmed_tx_hashes()
            })
            .await
    }

    /// Records a peer's self-reported chain height. Like the PBR, the
    /// height map carries its own lock rather than routing through the
    /// strand: it never needs to observe chain state, only other peers'
    /// reports, so there is nothing for the strand's FIFO to order it
    /// against.
    pub fn record_blockchain_height(&self, addr: &str, seq: u64) {
        self.heights.record(addr, seq);
    }

    pub async fn estimate_blockchain_height(&self) -> Result<u64> {
        let our_seq = self.head_bk_seq().await?;
        Ok(self.heights.estimate(our_seq))
    }

    pub fn peer_blockchain_heights(&self) -> Vec<(String, u64)> {
        self.heights.snapshot()
    }

    pub fn remove_connection(&self, addr: &str) {
        self.heights.remove(addr);
    }

    /// `V ≥ A` commit gate (§4.4). Executes the block, broadcasts it,
    /// and deletes the PBR entry if the threshold is met; otherwise a
    /// no-op. Absent hashes are not an error here -- callers invoke this
    /// speculatively after every validator addition.
    pub async fn can_make_block(&self, hash: Hash256) -> Result<()> {
        let validator_count = match self.pbr.validator_number(hash) {
            Ok(n) => n,
            Err(_) => return Ok(()),
        };
        let threshold = self.trust.get_agree_node_num();
        if (validator_count as u64) < threshold {
            return Ok(());
        }
        self.start_execute_signed_block(hash).await
    }

    async fn start_execute_signed_block(&self, hash: Hash256) -> Result<()> {
        let sb = self.pbr.get_signed_block(hash)?;
        self.execute_signed_block(sb.clone()).await?;
        if !self.config.disable_networking {
            self.pool
                .broadcast_message(blockchain_network::Message::GiveBlocks {
                    blocks: vec![sb],
                })
                .await;
        }
        self.pbr.delete_hash(hash)?;
        debug!(%hash, "block committed");
        Ok(())
    }

    /// Assembles, signs, and proposes a new block: adds it to the PBR
    /// with this node as the first validator, then (if also configured
    /// as master) broadcasts both `GivePendingBlock` and its own
    /// `GivePrepare`. Intended to be invoked on a schedule by whichever
    /// node `in_turn_the_node` names as proposer.
    pub async fn propose_block(&self) -> Result<Hash256> {
        let sb = self.create_and_execute_block().await?;
        let hash = self.pbr.add_signed_block(sb.clone(), now_secs())?;

        if self.config.disable_networking {
            return Ok(hash);
        }

        self.pool
            .broadcast_message(blockchain_network::Message::GivePendingBlock {
                blocks: vec![PendingSignedBlock::new(sb)],
            })
            .await;

        if self.chain.is_master() {
            let trust_seckey = self.chain.blockchain_trust_seckey();
            let sig = trust_seckey.sign_hash(&hash);
            self.pool
                .broadcast_message(blockchain_network::Message::GivePrepare { hash, sig })
                .await;
        }
        Ok(hash)
    }

    pub fn shutdown(&self) {
        self.strand.shutdown();
    }
}
