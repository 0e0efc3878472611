//! The wire message catalog and peer pool contract the consensus core
//! depends on. Real transport (TCP framing, libp2p, peer discovery) is
//! out of scope for this workspace; only the in-memory pool used by
//! tests is implemented here.

pub mod errors;
pub mod message;
pub mod peer_pool;

pub use errors::NetworkError;
pub use message::Message;
pub use peer_pool::{InMemoryPeerPool, PeerPool};
