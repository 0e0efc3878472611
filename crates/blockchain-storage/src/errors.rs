use thiserror::Error;

/// Errors local to the persistence layer, before they're folded into
/// [`blockchain_core::CoreError::Storage`] at the `ChainStore` boundary.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl From<StorageError> for blockchain_core::CoreError {
    fn from(e: StorageError) -> Self {
        blockchain_core::CoreError::Storage(e.to_string())
    }
}
