//! Cryptographic primitives
//!
//! This module provides:
//! - SHA-256, double SHA-256 and HASH160
//! - Base58Check encoding
//! - ECDSA key management (secp256k1)
//! - Wallet Import Format
//! - Secret buffer erasure

pub mod base58;
pub mod hash;
pub mod keys;
pub mod secure;
pub mod wif;

pub use base58::{decode_check, encode_check, Base58Error};
pub use hash::{double_sha256, hash160, sha256, sha256_hex};
pub use keys::{
    p2pkh_address, parse_public_key, public_key_from_hex, serialize_public_key, verify_digest,
    KeyError, KeyPair,
};
pub use secure::{secure_erase, secure_erase_all, secure_erase_string};
pub use wif::{export_wif, import_wif};
