//! Time-locked checks
//!
//! - Check creation, funding, cancellation and sweeping
//! - The QR payload printed on a check

pub mod payload;
pub mod service;

use thiserror::Error;

use crate::broadcast::BroadcastError;
use crate::crypto::KeyError;
use crate::script::ScriptError;
use crate::storage::StorageError;
use crate::transaction::{TransactionError, Txid};
use crate::wallet::WalletError;

pub use payload::CheckPayload;
pub use service::{CheckRequest, CheckService};

/// Check lifecycle errors
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid check date: {0}")]
    InvalidLocktime(String),
    #[error("Invalid check payload: {0}")]
    InvalidPayload(String),
    #[error("Check #{0} not found")]
    NotFound(u64),
    #[error("Check #{0} is no longer active")]
    NotActive(u64),
    #[error("Check does not match its record: {0}")]
    RecordMismatch(String),
    #[error("Broadcast of {txid} failed: {source}")]
    Broadcast {
        record_id: Option<u64>,
        txid: Txid,
        source: BroadcastError,
    },
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("Record store error: {0}")]
    Storage(#[from] StorageError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),
}
