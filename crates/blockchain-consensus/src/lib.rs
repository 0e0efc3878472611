//! The block-proposal consensus core: a permissioned, PBFT-style
//! prepare/commit protocol driven by a genesis-authenticated trust set
//! and agreement threshold.
//!
//! [`ConsensusNode`] is the entry point -- it owns the pending-block
//! registry, the trust oracle, the peer height map, and the
//! serialization strand that every chain mutation runs through.
//! [`handlers`] implements the inbound message protocol; [`timers`]
//! drives the outbound gossip loops.

pub mod config;
pub mod error;
pub mod handlers;
pub mod height;
pub mod node;
pub mod pbr;
pub mod strand;
pub mod timers;
pub mod trust;

pub use config::ConsensusConfig;
pub use error::{ConsensusError, Result};
pub use height::PeerHeightMap;
pub use node::ConsensusNode;
pub use pbr::{PendingBlockEntry, PendingBlockRegistry};
pub use strand::{Strand, StrandWorker};
pub use trust::TrustOracle;
