//! In-memory record store

use std::sync::{Mutex, MutexGuard};

use super::records::{CheckRecord, MultisigRecord, NewCheck, RecordRef, RecordSet};
use super::{RecordStore, StorageError};

/// Record store without persistence, for tools and tests
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<RecordSet>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordSet>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("record set lock poisoned".to_string()))
    }
}

impl RecordStore for MemoryRecordStore {
    fn insert_check(&self, check: NewCheck) -> Result<CheckRecord, StorageError> {
        Ok(self.lock()?.insert_check(check))
    }

    fn update_check(&self, record: CheckRecord) -> Result<(), StorageError> {
        self.lock()?.update_check(record)
    }

    fn remove_check(&self, id: u64) -> Result<Option<CheckRecord>, StorageError> {
        Ok(self.lock()?.checks.remove(&id))
    }

    fn check(&self, id: u64) -> Result<Option<CheckRecord>, StorageError> {
        Ok(self.lock()?.checks.get(&id).cloned())
    }

    fn checks(&self) -> Result<Vec<CheckRecord>, StorageError> {
        Ok(self.lock()?.checks.values().cloned().collect())
    }

    fn insert_multisig(
        &self,
        required_m: usize,
        pubkeys: Vec<String>,
        redeem_script: String,
        address: String,
    ) -> Result<MultisigRecord, StorageError> {
        Ok(self
            .lock()?
            .insert_multisig(required_m, pubkeys, redeem_script, address))
    }

    fn multisig(&self, id: u64) -> Result<Option<MultisigRecord>, StorageError> {
        Ok(self.lock()?.multisigs.get(&id).cloned())
    }

    fn multisigs(&self) -> Result<Vec<MultisigRecord>, StorageError> {
        Ok(self.lock()?.multisigs.values().cloned().collect())
    }

    fn set_transaction_hash(&self, target: RecordRef, txid: &str) -> Result<(), StorageError> {
        self.lock()?.set_transaction_hash(target, txid)
    }
}
