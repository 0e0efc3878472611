use std::fmt;

use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Serialize};

use crate::hash::Hash256;
use crate::{CryptoError, Result};

/// secp256k1 public key, serialized in 33-byte compressed form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey(secp256k1::PublicKey);

/// secp256k1 secret key. Never serialized or printed.
#[derive(Clone)]
pub struct SecretKey(secp256k1::SecretKey);

/// A recoverable ECDSA signature over a [`Hash256`]. Given `(sig, hash)`
/// the signer's [`PublicKey`] can be recovered without the signer having
/// attached it -- this is the only verification primitive the consensus
/// core uses; see [`pubkey_from_sig`].
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: [u8; 64],
    recovery_id: u8,
}

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        secp256k1::PublicKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn to_bytes(&self) -> [u8; 33] {
        self.0.serialize()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let (secret, _) = Secp256k1::new().generate_keypair(&mut OsRng);
        Self(secret)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        secp256k1::SecretKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.secret_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key(&Secp256k1::new()))
    }

    /// Sign a hash, producing a recoverable signature.
    pub fn sign_hash(&self, hash: &Hash256) -> Signature {
        let msg = Message::from_digest(hash.to_bytes());
        let secp = Secp256k1::new();
        let recoverable = secp.sign_ecdsa_recoverable(&msg, &self.0);
        let (recovery_id, bytes) = recoverable.serialize_compact();
        Signature {
            bytes,
            recovery_id: recovery_id.to_i32() as u8,
        }
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([hidden])")
    }
}

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(CryptoError::InvalidSignature(format!(
                "expected 65 bytes, got {}",
                bytes.len()
            )));
        }
        let mut sig_bytes = [0u8; 64];
        sig_bytes.copy_from_slice(&bytes[..64]);
        Ok(Self {
            bytes: sig_bytes,
            recovery_id: bytes[64],
        })
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&self.bytes);
        out[64] = self.recovery_id;
        out
    }

    fn to_recoverable(&self) -> Result<RecoverableSignature> {
        let id = RecoveryId::from_i32(self.recovery_id as i32)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        RecoverableSignature::from_compact(&self.bytes, id)
            .map_err(|e| CryptoError::InvalidSignature(e.to_string()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.to_bytes()))
    }
}

/// Recover the public key that produced `sig` over `hash`. This is the
/// sole authentication primitive used by the consensus core: a validator
/// is identified by what its signature recovers to, never by a key it
/// claims to hold.
pub fn pubkey_from_sig(sig: &Signature, hash: &Hash256) -> Result<PublicKey> {
    let recoverable = sig.to_recoverable()?;
    let msg = Message::from_digest(hash.to_bytes());
    let secp = Secp256k1::new();
    secp.recover_ecdsa(&msg, &recoverable)
        .map(PublicKey)
        .map_err(|_| CryptoError::RecoveryFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_roundtrip() {
        let sk = SecretKey::generate();
        let pk = sk.public_key();
        let hash = Hash256::digest(b"a block header");

        let sig = sk.sign_hash(&hash);
        let recovered = pubkey_from_sig(&sig, &hash).unwrap();

        assert_eq!(recovered, pk);
    }

    #[test]
    fn recovery_fails_for_tampered_hash() {
        let sk = SecretKey::generate();
        let pk = sk.public_key();
        let hash = Hash256::digest(b"original");
        let other = Hash256::digest(b"tampered");

        let sig = sk.sign_hash(&hash);
        let recovered = pubkey_from_sig(&sig, &other).unwrap();

        assert_ne!(recovered, pk);
    }

    #[test]
    fn signature_byte_roundtrip() {
        let sk = SecretKey::generate();
        let hash = Hash256::digest(b"payload");
        let sig = sk.sign_hash(&hash);

        let bytes = sig.to_bytes();
        let restored = Signature::from_bytes(&bytes).unwrap();
        assert_eq!(sig, restored);
    }

    #[test]
    fn different_keys_produce_different_recovered_identities() {
        let sk1 = SecretKey::generate();
        let sk2 = SecretKey::generate();
        let hash = Hash256::digest(b"same hash, two signers");

        let sig1 = sk1.sign_hash(&hash);
        let sig2 = sk2.sign_hash(&hash);

        let pk1 = pubkey_from_sig(&sig1, &hash).unwrap();
        let pk2 = pubkey_from_sig(&sig2, &hash).unwrap();

        assert_eq!(pk1, sk1.public_key());
        assert_eq!(pk2, sk2.public_key());
        assert_ne!(pk1, pk2);
    }
}
