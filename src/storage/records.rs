//! Persisted record shapes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::StorageError;

/// Lifecycle of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Funded or awaiting funding; redeemable after its locktime
    Active,
    /// Swept back by the writer
    Canceled,
    /// Swept by the payee
    Spent,
}

/// A time-locked check written to a payee
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRecord {
    pub id: u64,
    pub pay_to: String,
    /// Date the check becomes redeemable; source of the locktime
    pub date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Amount in smallest units
    pub amount: u64,
    pub memo: String,
    /// Writer's display name
    pub signature: String,
    /// P2SH address holding the funds
    pub address: String,
    /// WIF of the key able to redeem after the locktime
    pub derived_key: String,
    pub locktime: u32,
    /// Hex redeem script
    pub redeem_script: String,
    /// Funding txid, unset until broadcast succeeds
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status: CheckStatus,
    pub is_spent: bool,
}

impl CheckRecord {
    pub fn is_funded(&self) -> bool {
        self.transaction_hash.is_some()
    }
}

impl fmt::Debug for CheckRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRecord")
            .field("id", &self.id)
            .field("pay_to", &self.pay_to)
            .field("amount", &self.amount)
            .field("address", &self.address)
            .field("locktime", &self.locktime)
            .field("transaction_hash", &self.transaction_hash)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// A check before the store assigns it an id
#[derive(Clone, PartialEq, Eq)]
pub struct NewCheck {
    pub pay_to: String,
    pub date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    pub amount: u64,
    pub memo: String,
    pub signature: String,
    pub address: String,
    pub derived_key: String,
    pub locktime: u32,
    pub redeem_script: String,
}

impl NewCheck {
    fn into_record(self, id: u64) -> CheckRecord {
        CheckRecord {
            id,
            pay_to: self.pay_to,
            date: self.date,
            expiration_date: self.expiration_date,
            amount: self.amount,
            memo: self.memo,
            signature: self.signature,
            address: self.address,
            derived_key: self.derived_key,
            locktime: self.locktime,
            redeem_script: self.redeem_script,
            transaction_hash: None,
            created_at: Utc::now(),
            status: CheckStatus::Active,
            is_spent: false,
        }
    }
}

/// A multisig address and its latest spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigRecord {
    pub id: u64,
    pub required_m: usize,
    pub total_n: usize,
    /// Pubkeys (hex) in redeem-script order
    pub pubkeys: Vec<String>,
    /// Hex redeem script
    pub redeem_script: String,
    pub address: String,
    pub transaction_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The record a broadcast belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordRef {
    Check(u64),
    MultisigSpend(u64),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Check(id) => write!(f, "check #{}", id),
            RecordRef::MultisigSpend(id) => write!(f, "multisig #{}", id),
        }
    }
}

/// Every record in a store, as written to disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    pub next_id: u64,
    pub checks: BTreeMap<u64, CheckRecord>,
    pub multisigs: BTreeMap<u64, MultisigRecord>,
}

impl RecordSet {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert_check(&mut self, check: NewCheck) -> CheckRecord {
        let record = check.into_record(self.allocate_id());
        self.checks.insert(record.id, record.clone());
        record
    }

    pub fn update_check(&mut self, record: CheckRecord) -> Result<(), StorageError> {
        match self.checks.get_mut(&record.id) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StorageError::NotFound(RecordRef::Check(record.id).to_string())),
        }
    }

    pub fn insert_multisig(
        &mut self,
        required_m: usize,
        pubkeys: Vec<String>,
        redeem_script: String,
        address: String,
    ) -> MultisigRecord {
        if let Some(existing) = self.multisigs.values().find(|m| m.address == address) {
            return existing.clone();
        }
        let record = MultisigRecord {
            id: self.allocate_id(),
            required_m,
            total_n: pubkeys.len(),
            pubkeys,
            redeem_script,
            address,
            transaction_hash: None,
            created_at: Utc::now(),
        };
        self.multisigs.insert(record.id, record.clone());
        record
    }

    /// Record the txid of a broadcast against its originating record
    ///
    /// Setting the same txid twice succeeds; replacing a different one fails.
    pub fn set_transaction_hash(&mut self, target: RecordRef, txid: &str) -> Result<(), StorageError> {
        let slot = match target {
            RecordRef::Check(id) => self.checks.get_mut(&id).map(|c| &mut c.transaction_hash),
            RecordRef::MultisigSpend(id) => self.multisigs.get_mut(&id).map(|m| &mut m.transaction_hash),
        }
        .ok_or_else(|| StorageError::NotFound(target.to_string()))?;

        // checks are funded once; multisig records track their latest spend
        if let (RecordRef::Check(_), Some(existing)) = (target, slot.as_deref()) {
            if existing != txid {
                return Err(StorageError::Conflict(format!(
                    "{} already funded by {}",
                    target, existing
                )));
            }
        }
        *slot = Some(txid.to_string());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_check() -> NewCheck {
        NewCheck {
            pay_to: "Alice".to_string(),
            date: Utc::now(),
            expiration_date: None,
            amount: 500_000_000,
            memo: "rent".to_string(),
            signature: "Bob".to_string(),
            address: "9xsample".to_string(),
            derived_key: "QWIF".to_string(),
            locktime: 1_800_000_000,
            redeem_script: "00".to_string(),
        }
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut set = RecordSet::default();
        let a = set.insert_check(sample_check());
        let b = set.insert_check(sample_check());
        let m = set.insert_multisig(2, vec!["aa".into(), "bb".into()], "52".into(), "9m".into());
        assert!(a.id < b.id && b.id < m.id);
        assert_eq!(a.status, CheckStatus::Active);
        assert!(a.transaction_hash.is_none());
    }

    #[test]
    fn test_transaction_hash_set_once_for_checks() {
        let mut set = RecordSet::default();
        let check = set.insert_check(sample_check());
        let target = RecordRef::Check(check.id);

        set.set_transaction_hash(target, "aa").unwrap();
        set.set_transaction_hash(target, "aa").unwrap();
        assert!(matches!(
            set.set_transaction_hash(target, "bb"),
            Err(StorageError::Conflict(_))
        ));
        assert!(matches!(
            set.set_transaction_hash(RecordRef::Check(99), "aa"),
            Err(StorageError::NotFound(_))
        ));

        let m = set.insert_multisig(1, vec!["aa".into()], "51".into(), "9m".into());
        set.set_transaction_hash(RecordRef::MultisigSpend(m.id), "aa").unwrap();
        set.set_transaction_hash(RecordRef::MultisigSpend(m.id), "bb").unwrap();
        assert_eq!(set.multisigs[&m.id].transaction_hash.as_deref(), Some("bb"));
    }

    #[test]
    fn test_multisig_insert_is_idempotent_per_address() {
        let mut set = RecordSet::default();
        let a = set.insert_multisig(1, vec!["aa".into()], "51".into(), "9m".into());
        let b = set.insert_multisig(1, vec!["aa".into()], "51".into(), "9m".into());
        assert_eq!(a.id, b.id);
        assert_eq!(set.multisigs.len(), 1);
    }

    #[test]
    fn test_debug_hides_key() {
        let mut set = RecordSet::default();
        let check = set.insert_check(sample_check());
        assert!(!format!("{:?}", check).contains("QWIF"));
    }
}
