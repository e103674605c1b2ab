//! JSON file record store
//!
//! The whole record set lives in one JSON file. Every mutation rewrites it
//! through a temporary file and a rename, after rotating the previous file
//! into numbered backups.

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use super::records::{CheckRecord, MultisigRecord, NewCheck, RecordRef, RecordSet};
use super::{RecordStore, StorageError};

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub records_file: String,
    pub backup_enabled: bool,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".doge_vault"),
            records_file: "records.json".to_string(),
            backup_enabled: true,
            max_backups: 5,
        }
    }
}

/// File-backed record store
pub struct JsonRecordStore {
    config: StorageConfig,
    records: Mutex<RecordSet>,
}

impl JsonRecordStore {
    /// Open the store, loading existing records if the file is present
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.data_dir)?;
        let path = config.data_dir.join(&config.records_file);
        let records = if path.exists() {
            let reader = BufReader::new(fs::File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            RecordSet::default()
        };
        log::debug!("Opened record store at {}", path.display());
        Ok(Self {
            config,
            records: Mutex::new(records),
        })
    }

    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::open(StorageConfig::default())
    }

    fn records_path(&self) -> PathBuf {
        self.config.data_dir.join(&self.config.records_file)
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.backup.{}", self.config.records_file, index))
    }

    fn lock(&self) -> Result<MutexGuard<'_, RecordSet>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("record set lock poisoned".to_string()))
    }

    /// Apply `f` to a copy of the records and persist it; memory changes only
    /// once the file write succeeds
    fn mutate<R>(&self, f: impl FnOnce(&mut RecordSet) -> Result<R, StorageError>) -> Result<R, StorageError> {
        let mut records = self.lock()?;
        let mut updated = records.clone();
        let result = f(&mut updated)?;
        self.write(&updated)?;
        *records = updated;
        Ok(result)
    }

    fn write(&self, records: &RecordSet) -> Result<(), StorageError> {
        let path = self.records_path();

        if self.config.backup_enabled && path.exists() {
            self.rotate_backups()?;
            fs::copy(&path, self.backup_path(0))?;
        }

        let temp_path = self
            .config
            .data_dir
            .join(format!("{}.tmp", self.config.records_file));
        let writer = BufWriter::new(fs::File::create(&temp_path)?);
        serde_json::to_writer_pretty(writer, records)?;

        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn rotate_backups(&self) -> Result<(), StorageError> {
        if self.config.max_backups == 0 {
            return Ok(());
        }
        let oldest = self.backup_path(self.config.max_backups - 1);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }

        for i in (0..self.config.max_backups - 1).rev() {
            let current = self.backup_path(i);
            if current.exists() {
                fs::rename(&current, self.backup_path(i + 1))?;
            }
        }
        Ok(())
    }

    /// Backup indices present on disk, newest first
    pub fn list_backups(&self) -> Vec<usize> {
        (0..self.config.max_backups)
            .filter(|i| self.backup_path(*i).exists())
            .collect()
    }

    /// Replace the live records with a backup
    pub fn restore_backup(&self, index: usize) -> Result<(), StorageError> {
        let backup = self.backup_path(index);
        if !backup.exists() {
            return Err(StorageError::InvalidData(format!("Backup {} not found", index)));
        }
        let reader = BufReader::new(fs::File::open(&backup)?);
        let restored: RecordSet = serde_json::from_reader(reader)?;
        self.mutate(|records| {
            *records = restored;
            Ok(())
        })?;
        log::info!("Restored records from backup {}", index);
        Ok(())
    }
}

impl RecordStore for JsonRecordStore {
    fn insert_check(&self, check: NewCheck) -> Result<CheckRecord, StorageError> {
        self.mutate(|records| Ok(records.insert_check(check)))
    }

    fn update_check(&self, record: CheckRecord) -> Result<(), StorageError> {
        self.mutate(|records| records.update_check(record))
    }

    fn remove_check(&self, id: u64) -> Result<Option<CheckRecord>, StorageError> {
        self.mutate(|records| Ok(records.checks.remove(&id)))
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
        self.mutate(|records| Ok(records.insert_multisig(required_m, pubkeys, redeem_script, address)))
    }

    fn multisig(&self, id: u64) -> Result<Option<MultisigRecord>, StorageError> {
        Ok(self.lock()?.multisigs.get(&id).cloned())
    }

    fn multisigs(&self) -> Result<Vec<MultisigRecord>, StorageError> {
        Ok(self.lock()?.multisigs.values().cloned().collect())
    }

    fn set_transaction_hash(&self, target: RecordRef, txid: &str) -> Result<(), StorageError> {
        self.mutate(|records| records.set_transaction_hash(target, txid))
    }
}
