use thiserror::Error;

/// The error taxonomy for the consensus core.
///
/// Handlers never propagate these to peers (see `message`): they log
/// and move on. Local APIs (the `PendingBlockRegistry`/`TrustOracle`
/// methods) return them to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("absent: {0}")]
    Absent(String),

    #[error("capacity: a pending block is already in flight")]
    Capacity,

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("order: block sequence does not exceed the current head")]
    Order,

    #[error("transport: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
