use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::{CryptoError, Result};

/// A 32-byte SHA-256 hash, used as a block header hash and as the
/// canonical digest signed over by the trust-set and agreement-threshold
/// payloads.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256([u8; 32]);

impl Hash256 {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(CryptoError::InvalidHash(format!(
                "expected 32 bytes, got {}",
                slice.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes =
            hex::decode(hex_str).map_err(|e| CryptoError::InvalidHash(format!("{e}")))?;
        Self::from_slice(&bytes)
    }

    /// Hash an arbitrary byte string with SHA-256.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Hash the concatenation of several byte strings without an
    /// intermediate allocation per input, matching `pubkeysArrHash`'s
    /// `concat(pk_0 || pk_1 || ...)` construction.
    pub fn digest_concat<'a, I: IntoIterator<Item = &'a [u8]>>(parts: I) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn zero() -> Self {
        Self([0u8; 32])
    }
}

impl Default for Hash256 {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Hash the ASCII-decimal encoding of an integer, as used for signing the
/// agreement threshold (`GiveAgreeNumMessage`).
pub fn ascii_decimal_hash(n: u64) -> Hash256 {
    Hash256::digest(n.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let h = Hash256::digest(b"hello");
        let hex = h.to_hex();
        assert_eq!(Hash256::from_hex(&hex).unwrap(), h);
    }

    #[test]
    fn zero_is_default() {
        assert_eq!(Hash256::default(), Hash256::zero());
        assert_eq!(Hash256::zero().to_hex(), "0".repeat(64));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(Hash256::from_slice(&[0u8; 16]).is_err());
    }

    #[test]
    fn digest_concat_matches_manual_concat() {
        let a = b"abc";
        let b = b"def";
        let mut combined = Vec::new();
        combined.extend_from_slice(a);
        combined.extend_from_slice(b);
        assert_eq!(Hash256::digest_concat([&a[..], &b[..]]), Hash256::digest(&combined));
    }

    #[test]
    fn ascii_decimal_hash_matches_digest_of_string() {
        assert_eq!(ascii_decimal_hash(42), Hash256::digest(b"42"));
    }
}
