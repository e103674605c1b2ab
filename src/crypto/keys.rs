//! ECDSA key management
//!
//! Key pairs over secp256k1 that remember whether their public key is
//! published compressed, plus the P2PKH address derivation built on them.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

use super::base58::encode_check;
use super::hash::hash160;
use crate::params::NetworkParams;

/// Length of a compressed SEC1 public key
pub const COMPRESSED_PUBKEY_LEN: usize = 33;
/// Length of an uncompressed SEC1 public key
pub const UNCOMPRESSED_PUBKEY_LEN: usize = 65;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("Invalid WIF: {0}")]
    InvalidWif(String),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A private key with its public key and compression flag
///
/// The secret scalar is overwritten when the pair is dropped.
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub compressed: bool,
}

impl KeyPair {
    /// Generate a new random compressed key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
            compressed: true,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey, compressed: bool) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
            compressed,
        }
    }

    /// Create a key pair from a raw 32-byte scalar
    pub fn from_secret_bytes(bytes: &[u8], compressed: bool) -> Result<Self, KeyError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key, compressed))
    }

    /// Create a compressed key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = Zeroizing::new(hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?);
        Self::from_secret_bytes(&bytes, true)
    }

    /// Copy of the secret scalar, wiped when the wrapper drops
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret_key.secret_bytes())
    }

    /// SEC1 public key in the pair's compression format
    pub fn public_key_bytes(&self) -> Vec<u8> {
        serialize_public_key(&self.public_key, self.compressed)
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_bytes())
    }

    /// HASH160 of the serialized public key
    pub fn pubkey_hash(&self) -> [u8; 20] {
        hash160(&self.public_key_bytes())
    }

    /// P2PKH address for this key on the given network
    pub fn address(&self, params: &NetworkParams) -> String {
        p2pkh_address(params, &self.public_key_bytes())
    }

    /// Sign a 32-byte digest, producing a low-S signature
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, KeyError> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest)?;
        Ok(secp.sign_ecdsa(&message, &self.secret_key))
    }

    /// Verify a signature against this pair's public key
    pub fn verify_digest(&self, digest: &[u8; 32], signature: &Signature) -> bool {
        verify_digest(&self.public_key, digest, signature)
    }
}

impl PartialEq for KeyPair {
    fn eq(&self, other: &Self) -> bool {
        self.secret_key == other.secret_key && self.compressed == other.compressed
    }
}

impl Eq for KeyPair {}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

/// Serialize a public key as SEC1 bytes
pub fn serialize_public_key(public_key: &PublicKey, compressed: bool) -> Vec<u8> {
    if compressed {
        public_key.serialize().to_vec()
    } else {
        public_key.serialize_uncompressed().to_vec()
    }
}

/// Parse a SEC1 public key in either format
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    match bytes.len() {
        COMPRESSED_PUBKEY_LEN | UNCOMPRESSED_PUBKEY_LEN => {
            PublicKey::from_slice(bytes).map_err(|_| KeyError::InvalidPublicKey)
        }
        _ => Err(KeyError::InvalidPublicKey),
    }
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key.trim()).map_err(|_| KeyError::InvalidPublicKey)?;
    parse_public_key(&bytes)
}

/// Base58Check(p2pkh_version || HASH160(pubkey))
pub fn p2pkh_address(params: &NetworkParams, public_key: &[u8]) -> String {
    encode_check(params.p2pkh_version, &hash160(public_key))
}

/// Verify an ECDSA signature over a 32-byte digest
///
/// High-S signatures are normalized first so externally produced
/// signatures verify the same way ours do.
pub fn verify_digest(public_key: &PublicKey, digest: &[u8; 32], signature: &Signature) -> bool {
    let secp = Secp256k1::verification_only();
    let Ok(message) = Message::from_digest_slice(digest) else {
        return false;
    };
    let mut normalized = *signature;
    normalized.normalize_s();
    secp.verify_ecdsa(&message, &normalized, public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::sha256;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert!(kp.compressed);
        assert_eq!(kp.public_key_bytes().len(), COMPRESSED_PUBKEY_LEN);
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let digest = sha256(b"Hello, Dogecoin!");

        let signature = kp.sign_digest(&digest).unwrap();
        assert!(kp.verify_digest(&digest, &signature));

        let other = sha256(b"Hello, Bitcoin!");
        assert!(!kp.verify_digest(&other, &signature));
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let private_hex = hex::encode(*kp1.secret_bytes());

        let kp2 = KeyPair::from_private_key_hex(&private_hex).unwrap();
        assert_eq!(kp1, kp2);
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
    }

    #[test]
    fn test_uncompressed_serialization() {
        let kp = KeyPair::generate();
        let uncompressed = KeyPair::from_secret_key(kp.secret_key, false);
        assert_eq!(uncompressed.public_key_bytes().len(), UNCOMPRESSED_PUBKEY_LEN);
        assert_ne!(kp, uncompressed);
        assert_ne!(
            kp.address(&NetworkParams::mainnet()),
            uncompressed.address(&NetworkParams::mainnet())
        );
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        // Dogecoin mainnet P2PKH addresses start with D
        assert!(kp.address(&NetworkParams::mainnet()).starts_with('D'));
        // Testnet P2PKH addresses start with n
        assert!(kp.address(&NetworkParams::testnet()).starts_with('n'));
    }

    #[test]
    fn test_parse_public_key_rejects_bad_length() {
        assert!(matches!(
            parse_public_key(&[0x02; 20]),
            Err(KeyError::InvalidPublicKey)
        ));
        let kp = KeyPair::generate();
        assert_eq!(
            parse_public_key(&kp.public_key_bytes()).unwrap(),
            kp.public_key
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = KeyPair::generate();
        let rendered = format!("{:?}", kp);
        assert!(!rendered.contains(&hex::encode(*kp.secret_bytes())));
    }
}
