use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::NetworkError;
use crate::message::Message;

/// The send/broadcast contract the consensus core requires of the peer
/// connection pool. Wire framing, transport security, and peer
/// discovery are out of scope for this workspace; only this narrow
/// interface is specified.
#[async_trait]
pub trait PeerPool: Send + Sync {
    async fn broadcast_message(&self, msg: Message);
    async fn send_message(&self, addr: &str, msg: Message) -> Result<(), NetworkError>;
    fn is_conn_exist(&self, addr: &str) -> bool;
    fn size(&self) -> usize;
}

/// An in-memory peer pool used by tests and as a default when no real
/// transport is configured. Each "connection" is an mpsc channel the
/// test harness can drain to observe what the node under test sent.
#[derive(Default)]
pub struct InMemoryPeerPool {
    peers: Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>,
}

impl InMemoryPeerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer and returns the receiving end of its channel,
    /// which tests drain to assert on outbound messages.
    pub fn connect(&self, addr: impl Into<String>) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.peers.lock().unwrap().insert(addr.into(), tx);
        rx
    }

    pub fn disconnect(&self, addr: &str) {
        self.peers.lock().unwrap().remove(addr);
    }
}

#[async_trait]
impl PeerPool for InMemoryPeerPool {
    async fn broadcast_message(&self, msg: Message) {
        let peers = self.peers.lock().unwrap();
        for tx in peers.values() {
            // A closed receiver just means the test dropped its handle;
            // matches the original's "log and move on" transport policy.
            let _ = tx.send(msg.clone());
        }
    }

    async fn send_message(&self, addr: &str, msg: Message) -> Result<(), NetworkError> {
        let tx = {
            let peers = self.peers.lock().unwrap();
            peers.get(addr).cloned()
        };
        match tx {
            Some(tx) => tx.send(msg).map_err(|_| NetworkError::SendFailed {
                addr: addr.to_string(),
                reason: "receiver dropped".to_string(),
            }),
            None => Err(NetworkError::PeerNotFound(addr.to_string())),
        }
    }

    fn is_conn_exist(&self, addr: &str) -> bool {
        self.peers.lock().unwrap().contains_key(addr)
    }

    fn size(&self) -> usize {
        self.peers.lock().unwrap().len()
    }
}
