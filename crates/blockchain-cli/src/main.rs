//! Boots a single consensus node: opens its chain store, wires up the
//! strand worker and periodic gossip ticks, and runs until interrupted.
//!
//! No production transport is built here (see the consensus core's
//! scope notes) -- `--db-path` picks a persistent `sled` store or an
//! in-memory one, and peers are an empty `InMemoryPeerPool` unless a
//! future transport crate fills it in.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use blockchain_consensus::{ConsensusConfig, ConsensusNode};
use blockchain_core::{ChainStore, InMemoryChainStore};
use blockchain_crypto::{PublicKey, SecretKey};
use blockchain_network::{InMemoryPeerPool, PeerPool};
use blockchain_storage::SledChainStore;

#[derive(Parser)]
#[command(name = "blockchain-node", about = "Runs a single consensus node")]
struct Cli {
    /// Directory for the persistent chain store. Omit to run in-memory.
    #[arg(long)]
    db_path: Option<String>,

    /// Acts as the block proposer master for this process.
    #[arg(long)]
    master: bool,

    /// Acts as the genesis node (authoritative for trust-set/threshold
    /// updates).
    #[arg(long)]
    genesis: bool,

    /// Hex-encoded genesis public key other nodes trust. Required
    /// unless `--genesis` is set, in which case this node's own
    /// identity key is used.
    #[arg(long)]
    genesis_pubkey: Option<String>,

    /// Round-robin validator slot count, used by `in_turn_the_node`.
    #[arg(long, default_value_t = 1)]
    validator_count: u64,

    /// This node's index within the round-robin schedule.
    #[arg(long, default_value_t = 0)]
    node_index: u64,

    /// Seconds per proposer slot.
    #[arg(long, default_value_t = 10)]
    slot_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let seckey = SecretKey::generate();
    let trust_seckey = SecretKey::generate();

    let chain: Arc<dyn ChainStore> = match &cli.db_path {
        Some(path) => Arc::new(
            SledChainStore::open(
                path,
                cli.master,
                cli.genesis,
                seckey,
                trust_seckey,
                cli.validator_count,
                cli.node_index,
                cli.slot_seconds,
            )
            .context("failed to open chain store")?,
        ),
        None => Arc::new(InMemoryChainStore::new(
            cli.master,
            cli.genesis,
            seckey,
            trust_seckey,
            cli.validator_count,
            cli.node_index,
            cli.slot_seconds,
        )),
    };

    let genesis_pubkey = match (&cli.genesis_pubkey, cli.genesis) {
        (Some(hex), _) => {
            let bytes = hex::decode(hex).context("genesis pubkey is not valid hex")?;
            PublicKey::from_bytes(&bytes).context("genesis pubkey is not a valid public key")?
        }
        (None, true) => chain.blockchain_pubkey(),
        (None, false) => anyhow::bail!("--genesis-pubkey is required unless --genesis is set"),
    };

    let pool: Arc<dyn PeerPool> = Arc::new(InMemoryPeerPool::new());
    let config = ConsensusConfig::default();
    let (node, worker) = ConsensusNode::new(config, genesis_pubkey, chain, pool);
    let node = Arc::new(node);

    tokio::spawn(worker.run());
    let timer_handles = blockchain_consensus::timers::spawn_all(node.clone());

    info!(
        master = cli.master,
        genesis = cli.genesis,
        head = node.head_bk_seq().await?,
        "node started"
    );

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");

    for handle in timer_handles {
        handle.abort();
    }
    node.shutdown();
    Ok(())
}
