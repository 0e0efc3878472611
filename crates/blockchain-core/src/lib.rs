//! Block and transaction types, and the `ChainStore` collaborator
//! interface the consensus core requires of the underlying blockchain.
//!
//! Everything in this crate is deliberately narrow: persistence, the
//! transaction pool, and block execution are real engineering concerns,
//! but the consensus protocol this workspace exists to implement only
//! needs the surface captured in [`chain::ChainStore`].

pub mod block;
pub mod chain;
pub mod error;
pub mod transaction;

pub use block::{Block, BlockHeader, PendingSignedBlock, SignedBlock};
pub use chain::{ChainStore, InMemoryChainStore, InjectOutcome};
pub use error::{CoreError, Result};
pub use transaction::Transaction;
