use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    #[error("send to {addr} failed: {reason}")]
    SendFailed { addr: String, reason: String },
}
