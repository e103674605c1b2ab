//! Transaction construction
//!
//! - Legacy transaction model, serialization and signature hashing
//! - UTXO scanning
//! - Fee estimation
//! - Assembly of funding, multisig and CLTV redeem transactions

pub mod assembler;
pub mod fee;
pub mod sign;
pub mod tx;
pub mod utxo;

use thiserror::Error;

use crate::codec::CodecError;
use crate::crypto::KeyError;
use crate::script::ScriptError;

pub use assembler::{TransactionAssembler, UnsignedSpend};
pub use fee::{estimate_size, FeeRate, InputKind};
pub use sign::{input_signature, p2pkh_script_sig, single_key_p2sh_script_sig};
pub use tx::{
    OutPoint, SigHashType, Transaction, TransactionBuilder, TxIn, TxOut, Txid,
    SEQUENCE_FINAL, SEQUENCE_LOCKTIME_ENABLED, TX_VERSION,
};
pub use utxo::{filter_spendable, spent_outpoints, unspent_outputs_paying, Utxo};

/// Transaction-related errors
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: u64, required: u64 },
    #[error("Wallet is locked: unlock it before spending")]
    WalletLocked,
    #[error("No spendable outputs at {0}")]
    NoSpendableOutputs(String),
    #[error("Locktime {locktime} not reached (now {now})")]
    TimelockNotReached { locktime: u32, now: i64 },
    #[error("Signing key does not match the locked output")]
    KeyMismatch,
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Input {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("Decode error: {0}")]
    Decode(#[from] CodecError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}
