//! Record storage for checks and multisig addresses

pub mod memory;
pub mod persistence;
pub mod records;

use std::io;
use thiserror::Error;

pub use memory::MemoryRecordStore;
pub use persistence::{JsonRecordStore, StorageConfig};
pub use records::{CheckRecord, CheckStatus, MultisigRecord, NewCheck, RecordRef, RecordSet};

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record conflict: {0}")]
    Conflict(String),
    #[error("Record store unavailable: {0}")]
    Unavailable(String),
}

/// Where checks and multisig records live
///
/// Ids are assigned by the store and increase monotonically. Mutations are
/// serialized by the implementation.
pub trait RecordStore: Send + Sync {
    fn insert_check(&self, check: NewCheck) -> Result<CheckRecord, StorageError>;

    /// Replace a check by id
    fn update_check(&self, record: CheckRecord) -> Result<(), StorageError>;

    fn remove_check(&self, id: u64) -> Result<Option<CheckRecord>, StorageError>;

    fn check(&self, id: u64) -> Result<Option<CheckRecord>, StorageError>;

    fn checks(&self) -> Result<Vec<CheckRecord>, StorageError>;

    /// Insert a multisig record; an existing record for the same address is returned as is
    fn insert_multisig(
        &self,
        required_m: usize,
        pubkeys: Vec<String>,
        redeem_script: String,
        address: String,
    ) -> Result<MultisigRecord, StorageError>;

    fn multisig(&self, id: u64) -> Result<Option<MultisigRecord>, StorageError>;

    fn multisigs(&self) -> Result<Vec<MultisigRecord>, StorageError>;

    fn set_transaction_hash(&self, target: RecordRef, txid: &str) -> Result<(), StorageError>;
}
