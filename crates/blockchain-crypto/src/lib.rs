pub mod hash;
pub mod signature;

use thiserror::Error;

/// Core cryptographic errors encountered throughout the workspace.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("invalid key format: {0}")]
    InvalidKey(String),
    #[error("invalid signature format: {0}")]
    InvalidSignature(String),
    #[error("signature does not recover to a valid public key")]
    RecoveryFailed,
    #[error("invalid hash format: {0}")]
    InvalidHash(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;

pub use hash::{ascii_decimal_hash, Hash256};
pub use signature::{pubkey_from_sig, PublicKey, SecretKey, Signature};
