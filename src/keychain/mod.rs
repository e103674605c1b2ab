//! Deterministic key management
//!
//! - BIP32 private derivation
//! - Purpose-driven key retrieval with an ordered list of sources
//! - Lock/unlock of the private chain node

pub mod bip32;
pub mod material;

pub use bip32::{ChildNumber, ExtendedPrivKey, HARDENED_OFFSET};
pub use material::{KeyMaterial, KeyPurpose, KeySource, DEFAULT_GAP_LIMIT};
