//! Doge Vault: transaction construction and key authorization for a
//! self-custody Dogecoin wallet
//!
//! This crate provides:
//! - Hierarchical key material (BIP32/BIP44) with lock-aware signing
//! - Redeem scripts for CLTV time locks, M-of-N multisig and HTLCs
//! - Dogecoin signed messages and content fingerprints
//! - Funding, multisig and CLTV redeem transaction assembly
//! - Partial-signature collection for multisig spends
//! - Broadcast coordination with record bookkeeping
//! - Time-locked "checks" redeemable from a QR payload
//! - JSON persistence of checks and multisig records
//!
//! # Example
//!
//! ```rust
//! use doge_vault::keychain::KeyMaterial;
//! use doge_vault::params::NetworkParams;
//! use doge_vault::script::LockedOutputSpec;
//!
//! let keys = KeyMaterial::from_seed(&[7u8; 32], NetworkParams::mainnet()).unwrap();
//! let key = keys.key_at(0).unwrap();
//!
//! // Lock funds to the key until a Unix timestamp
//! let spec = LockedOutputSpec::new(&NetworkParams::mainnet(), 1_800_000_000, &key.public_key_bytes()).unwrap();
//! assert!(spec.address.starts_with('9') || spec.address.starts_with('A'));
//! ```

pub mod broadcast;
pub mod check;
pub mod cli;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod keychain;
pub mod message;
pub mod multisig;
pub mod params;
pub mod script;
pub mod storage;
pub mod transaction;
pub mod wallet;

// Re-export commonly used types
pub use broadcast::{BroadcastCoordinator, Broadcaster, MemoryBroadcaster};
pub use check::{CheckPayload, CheckRequest, CheckService};
pub use config::VaultConfig;
pub use crypto::KeyPair;
pub use keychain::{KeyMaterial, KeyPurpose};
pub use message::{sign_message, verify_message, SignedMessage};
pub use multisig::{MultisigSession, MultisigSessions, PartialSignature};
pub use params::{Network, NetworkParams, COIN};
pub use script::{Address, HtlcContract, LockedOutputSpec, MultisigSpec, Script, ScriptBuilder};
pub use storage::{CheckRecord, JsonRecordStore, MultisigRecord, RecordStore};
pub use transaction::{FeeRate, Transaction, TransactionAssembler, Txid, Utxo};
pub use wallet::{RelevanceTracker, Wallet};
