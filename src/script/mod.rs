//! Script construction for locking conditions
//!
//! This module provides:
//! - A byte-level script builder with minimal pushes and numbers
//! - P2PKH and P2SH addresses
//! - CLTV time-locked redeem scripts
//! - M-of-N CHECKMULTISIG redeem scripts
//! - Hashed time-locked contracts
//! - Registration of scripts with the wallet's tracker

pub mod address;
pub mod builder;
pub mod cltv;
pub mod htlc;
pub mod multisig;
pub mod opcodes;
pub mod watch;

use thiserror::Error;

pub use address::{
    p2pkh_script_pubkey, p2sh_script_pubkey, script_to_p2sh_address, Address, AddressKind,
};
pub use builder::{Instruction, Script, ScriptBuilder, MAX_REDEEM_SCRIPT_SIZE};
pub use cltv::{build_cltv_script, parse_cltv_script, LockedOutputSpec};
pub use htlc::HtlcContract;
pub use multisig::{build_multisig_script, parse_multisig_script, MultisigSpec, MAX_MULTISIG_KEYS};
pub use watch::register_watched_script;

/// Script-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Invalid multisig parameters: {0}")]
    InvalidMultisigParams(String),
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid script: {0}")]
    InvalidScript(String),
    #[error("Script too large: {0} bytes")]
    ScriptTooLarge(usize),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Output already funded by {0}")]
    AlreadyFunded(String),
    #[error("Secret does not match the contract hash")]
    InvalidSecret,
}
