//! A `sled`-backed persistent [`blockchain_core::ChainStore`]
//! implementation, used wherever a node needs committed blocks and the
//! unconfirmed transaction pool to survive a restart -- the in-memory
//! store in `blockchain-core` is for tests and the default otherwise.

pub mod chain_store;
pub mod errors;

pub use chain_store::SledChainStore;
pub use errors::StorageError;
