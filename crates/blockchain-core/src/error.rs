use thiserror::Error;

/// Errors surfaced by the chain-store collaborator.
///
/// These map to the error kinds in the consensus error taxonomy
/// (`Absent`, `Order`, `ConstraintViolation`) but are kept distinct so
/// `blockchain-core` has no dependency on `blockchain-consensus`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("block sequence {seq} does not strictly exceed head {head}")]
    OutOfOrder { seq: u64, head: u64 },

    #[error("transaction rejected by hard constraint: {0}")]
    HardConstraint(String),

    #[error("transaction rejected by soft constraint: {0}")]
    SoftConstraint(String),

    #[error("not configured as a master node")]
    NotMaster,

    #[error("signature error: {0}")]
    Signature(#[from] blockchain_crypto::CryptoError),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
