//! Writing, canceling and sweeping time-locked checks
//!
//! A check is a P2SH output locked by a CLTV script to a fresh wallet key.
//! The key's WIF travels with the paper check, so whoever holds it (the
//! payee, or the writer canceling) can sweep the funds once the locktime
//! has passed.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::payload::CheckPayload;
use super::CheckError;
use crate::broadcast::BroadcastCoordinator;
use crate::crypto::keys::KeyPair;
use crate::crypto::wif::{export_wif, import_wif};
use crate::keychain::KeyPurpose;
use crate::params::{NetworkParams, MAX_MONEY};
use crate::script::{register_watched_script, Address, LockedOutputSpec};
use crate::storage::{CheckRecord, CheckStatus, NewCheck, RecordRef, RecordStore};
use crate::transaction::{FeeRate, Transaction, TransactionAssembler, TransactionError, Txid, Utxo};
use crate::wallet::{Wallet, WalletError};

/// What the writer fills in on a check
#[derive(Debug, Clone)]
pub struct CheckRequest {
    pub pay_to: String,
    /// Redeemable from this instant; becomes the locktime
    pub date: DateTime<Utc>,
    pub expiration_date: Option<DateTime<Utc>>,
    /// Amount in smallest units
    pub amount: u64,
    pub memo: String,
    /// Writer's display name
    pub signature: String,
}

/// Check lifecycle over one wallet, record store and broadcaster
pub struct CheckService {
    wallet: Arc<Wallet>,
    store: Arc<dyn RecordStore>,
    coordinator: Arc<BroadcastCoordinator>,
    fee_rate: FeeRate,
}

impl CheckService {
    pub fn new(
        wallet: Arc<Wallet>,
        store: Arc<dyn RecordStore>,
        coordinator: Arc<BroadcastCoordinator>,
    ) -> Self {
        let fee_rate = FeeRate::per_kb(wallet.params().default_fee_per_kb);
        Self {
            wallet,
            store,
            coordinator,
            fee_rate,
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: FeeRate) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    fn params(&self) -> &NetworkParams {
        self.wallet.params()
    }

    fn assembler(&self) -> TransactionAssembler<'_> {
        TransactionAssembler::new(self.params()).with_fee_rate(self.fee_rate)
    }

    /// Write a check and fund it
    ///
    /// The record is persisted before the funding transaction is built. If
    /// funding cannot be built the record is removed again; if broadcast
    /// fails the record stays with no transaction hash, and the error carries
    /// the txid for a later [`BroadcastCoordinator::retry`].
    pub async fn create_check(&self, request: CheckRequest) -> Result<CheckRecord, CheckError> {
        let locktime = self.validate(&request)?;
        if self.wallet.is_locked() {
            return Err(TransactionError::WalletLocked.into());
        }

        let key = self.wallet.key_for(KeyPurpose::CheckLock).map_err(|e| match e {
            WalletError::Locked => CheckError::Transaction(TransactionError::WalletLocked),
            other => CheckError::Wallet(other),
        })?;
        let spec = LockedOutputSpec::new(self.params(), locktime, &key.public_key_bytes())?;
        register_watched_script(self.wallet.as_ref(), &spec.script_pubkey);
        let wif = export_wif(&key, self.params())?;

        log::info!(
            "Created check address {} (locktime {}, date {})",
            spec.address,
            locktime,
            request.date
        );

        let record = self.store.insert_check(NewCheck {
            pay_to: request.pay_to,
            date: request.date,
            expiration_date: request.expiration_date,
            amount: request.amount,
            memo: request.memo,
            signature: request.signature,
            address: spec.address.clone(),
            derived_key: wif.to_string(),
            locktime,
            redeem_script: spec.redeem_script.to_hex(),
        })?;

        let destination = Address::from_base58(self.params(), &spec.address)?;
        let funding = match self
            .assembler()
            .build_funding_transaction(&self.wallet, &destination, request.amount)
        {
            Ok(tx) => tx,
            Err(e) => {
                // nothing reached the network; drop the record with it
                if let Err(remove) = self.store.remove_check(record.id) {
                    log::warn!("Could not remove check #{}: {}", record.id, remove);
                }
                return Err(e.into());
            }
        };

        let txid = funding.txid();
        self.coordinator
            .broadcast(&funding, Some(RecordRef::Check(record.id)))
            .await
            .map_err(|source| CheckError::Broadcast {
                record_id: Some(record.id),
                txid,
                source,
            })?;

        self.require(record.id)
    }

    fn validate(&self, request: &CheckRequest) -> Result<u32, CheckError> {
        if request.amount == 0 {
            return Err(CheckError::InvalidAmount("amount must be positive".to_string()));
        }
        if request.amount < self.params().dust_limit {
            return Err(CheckError::InvalidAmount(format!(
                "amount {} is below the dust limit {}",
                request.amount,
                self.params().dust_limit
            )));
        }
        if request.amount > MAX_MONEY {
            return Err(CheckError::InvalidAmount(format!(
                "amount {} exceeds the money range {}",
                request.amount, MAX_MONEY
            )));
        }

        let timestamp = request.date.timestamp();
        let locktime = u32::try_from(timestamp)
            .ok()
            .filter(|l| self.params().is_timestamp_locktime(*l))
            .ok_or_else(|| {
                CheckError::InvalidLocktime(format!("{} is outside the timestamp range", timestamp))
            })?;

        if let Some(expiration) = request.expiration_date {
            if expiration < request.date {
                return Err(CheckError::InvalidLocktime(
                    "expiration date precedes the check date".to_string(),
                ));
            }
        }
        Ok(locktime)
    }

    pub fn check(&self, id: u64) -> Result<Option<CheckRecord>, CheckError> {
        Ok(self.store.check(id)?)
    }

    fn require(&self, id: u64) -> Result<CheckRecord, CheckError> {
        self.store.check(id)?.ok_or(CheckError::NotFound(id))
    }

    /// Checks that are neither canceled nor spent, newest first
    pub fn active_checks(&self) -> Result<Vec<CheckRecord>, CheckError> {
        let mut checks: Vec<CheckRecord> = self
            .store
            .checks()?
            .into_iter()
            .filter(|c| c.status == CheckStatus::Active && !c.is_spent)
            .collect();
        checks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(checks)
    }

    /// QR payload printed on the check
    pub fn payload_for(&self, id: u64) -> Result<CheckPayload, CheckError> {
        let record = self.require(id)?;
        let address = Address::from_base58(self.params(), &record.address)?;
        let wif = zeroize::Zeroizing::new(record.derived_key.clone());
        Ok(CheckPayload::new(wif, Some(address), Some(record.locktime)))
    }

    /// Sweep a check back into the wallet after its locktime
    ///
    /// `now` is the current Unix time.
    pub async fn cancel_check(&self, id: u64, now: i64) -> Result<Txid, CheckError> {
        let mut record = self.require(id)?;
        if record.status != CheckStatus::Active || record.is_spent {
            return Err(CheckError::NotActive(id));
        }

        let key = import_wif(&record.derived_key, self.params())?;
        let spec = self.spec_for(&key, record.locktime, &record.address)?;
        let utxos = self.wallet.watched_outputs(&spec.script_pubkey);
        let destination = self.wallet.receive_address()?;

        let txid = self.redeem(&spec, &key, &utxos, &destination, now, Some(id)).await?;

        record.status = CheckStatus::Canceled;
        record.is_spent = true;
        self.store.update_check(record)?;
        log::info!("Canceled check #{} in {}", id, txid);
        Ok(txid)
    }

    /// Sweep a check from its QR payload to `destination`
    ///
    /// `utxos` are the outputs known to pay the check. A full payload spends
    /// the CLTV address and marks a local record for it spent. A legacy
    /// payload without lock details sweeps the key's own P2PKH outputs.
    pub async fn sweep_payload(
        &self,
        payload: &CheckPayload,
        utxos: &[Utxo],
        destination: &Address,
        now: i64,
    ) -> Result<Txid, CheckError> {
        let key = payload.key(self.params())?;
        let (Some(address), Some(locktime)) = (&payload.address, payload.locktime) else {
            let tx = self.assembler().build_key_sweep(&key, utxos, destination)?;
            let txid = self.submit(&tx, None).await?;
            log::info!("Swept key {} in {}", key.address(self.params()), txid);
            return Ok(txid);
        };
        let spec = self.spec_for(&key, locktime, &address.to_string())?;

        let local = self
            .store
            .checks()?
            .into_iter()
            .find(|c| c.address == spec.address);
        let txid = self
            .redeem(&spec, &key, utxos, destination, now, local.as_ref().map(|c| c.id))
            .await?;

        if let Some(mut record) = local {
            record.status = CheckStatus::Spent;
            record.is_spent = true;
            self.store.update_check(record)?;
        }
        log::info!("Swept check at {} in {}", spec.address, txid);
        Ok(txid)
    }

    /// Rebuild the locked output from the key and confirm it matches the address
    fn spec_for(&self, key: &KeyPair, locktime: u32, address: &str) -> Result<LockedOutputSpec, CheckError> {
        let spec = LockedOutputSpec::new(self.params(), locktime, &key.public_key_bytes())?;
        if spec.address != address {
            return Err(CheckError::RecordMismatch(format!(
                "key and locktime produce {}, expected {}",
                spec.address, address
            )));
        }
        Ok(spec)
    }

    async fn redeem(
        &self,
        spec: &LockedOutputSpec,
        key: &KeyPair,
        utxos: &[Utxo],
        destination: &Address,
        now: i64,
        record_id: Option<u64>,
    ) -> Result<Txid, CheckError> {
        let tx = self
            .assembler()
            .build_cltv_redeem(spec, key, utxos, destination, now, false)?;
        self.submit(&tx, record_id).await
    }

    async fn submit(&self, tx: &Transaction, record_id: Option<u64>) -> Result<Txid, CheckError> {
        let txid = tx.txid();
        self.coordinator
            .broadcast(tx, None)
            .await
            .map_err(|source| CheckError::Broadcast {
                record_id,
                txid,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MemoryBroadcaster;
    use crate::keychain::KeyMaterial;
    use crate::params::COIN;
    use crate::script::{build_cltv_script, script_to_p2sh_address};
    use crate::storage::MemoryRecordStore;
    use crate::transaction::{OutPoint, Transaction, TxIn, TxOut, SEQUENCE_FINAL};
    use crate::wallet::RelevanceTracker;
    use chrono::Duration;

    struct Fixture {
        wallet: Arc<Wallet>,
        store: Arc<MemoryRecordStore>,
        broadcaster: Arc<MemoryBroadcaster>,
        coordinator: Arc<BroadcastCoordinator>,
        service: CheckService,
    }

    fn fixture(balance: u64) -> Fixture {
        let params = NetworkParams::mainnet();
        let wallet = Arc::new(Wallet::new(KeyMaterial::from_seed(&[5u8; 32], params).unwrap()));
        if balance > 0 {
            let address = wallet.receive_address().unwrap();
            let deposit = Transaction::new(
                vec![TxIn::new(OutPoint::new(Txid::from_internal([0xaa; 32]), 0), SEQUENCE_FINAL)],
                vec![TxOut::new(balance, address.script_pubkey())],
            );
            wallet.register_transaction(&deposit).unwrap();
        }

        let store = Arc::new(MemoryRecordStore::new());
        let broadcaster = Arc::new(MemoryBroadcaster::new());
        let coordinator = Arc::new(BroadcastCoordinator::new(
            broadcaster.clone(),
            wallet.clone(),
            store.clone(),
        ));
        let service = CheckService::new(wallet.clone(), store.clone(), coordinator.clone());
        Fixture {
            wallet,
            store,
            broadcaster,
            coordinator,
            service,
        }
    }

    fn request(date: DateTime<Utc>, amount: u64) -> CheckRequest {
        CheckRequest {
            pay_to: "Alice".to_string(),
            date,
            expiration_date: None,
            amount,
            memo: "for the bike".to_string(),
            signature: "Bob".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_check_tomorrow() {
        let f = fixture(10 * COIN);
        let params = NetworkParams::mainnet();
        let date = Utc::now() + Duration::seconds(86_400);
        f.broadcaster.set_offline(true).await;

        let err = f.service.create_check(request(date, 5 * COIN)).await.unwrap_err();
        let (record_id, txid) = match err {
            CheckError::Broadcast { record_id: Some(id), txid, .. } => (id, txid),
            other => panic!("unexpected error: {}", other),
        };

        let record = f.store.check(record_id).unwrap().unwrap();
        assert_eq!(record.amount, 5 * COIN);
        assert_eq!(record.locktime as i64, date.timestamp());
        assert!(record.transaction_hash.is_none());

        let key = import_wif(&record.derived_key, &params).unwrap();
        let script = build_cltv_script(record.locktime, &key.public_key_bytes()).unwrap();
        assert_eq!(record.address, script_to_p2sh_address(&params, &script).to_string());
        assert_eq!(record.redeem_script, script.to_hex());

        f.broadcaster.set_offline(false).await;
        f.coordinator.retry(&txid).await.unwrap();
        let record = f.store.check(record_id).unwrap().unwrap();
        assert_eq!(record.transaction_hash, Some(txid.to_string()));

        // registered before broadcast, so the wallet already sees the locked output
        let watched = f.wallet.watched_outputs(&script_to_p2sh_address(&params, &script).script_pubkey());
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].value(), 5 * COIN);
    }

    #[tokio::test]
    async fn test_create_then_cancel() {
        let f = fixture(10 * COIN);
        let date = Utc::now() + Duration::seconds(86_400);
        let record = f.service.create_check(request(date, 5 * COIN)).await.unwrap();
        assert!(record.is_funded());
        assert_eq!(f.service.active_checks().unwrap().len(), 1);

        let payload = f.service.payload_for(record.id).unwrap();
        assert_eq!(payload.encode().split('|').count(), 3);

        assert!(matches!(
            f.service.cancel_check(record.id, Utc::now().timestamp()).await,
            Err(CheckError::Transaction(TransactionError::TimelockNotReached { .. }))
        ));

        let balance_before = f.wallet.balance();
        let txid = f.service.cancel_check(record.id, date.timestamp() + 1).await.unwrap();
        assert!(f.broadcaster.accepted(&txid).await.is_some());
        assert!(f.wallet.balance() > balance_before);

        let record = f.store.check(record.id).unwrap().unwrap();
        assert_eq!(record.status, CheckStatus::Canceled);
        assert!(record.is_spent);
        assert!(f.service.active_checks().unwrap().is_empty());
        assert!(matches!(
            f.service.cancel_check(record.id, date.timestamp() + 1).await,
            Err(CheckError::NotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_from_payload() {
        let f = fixture(10 * COIN);
        let params = NetworkParams::mainnet();
        let date = Utc::now() + Duration::seconds(3_600);
        let record = f.service.create_check(request(date, 3 * COIN)).await.unwrap();

        let text = f.service.payload_for(record.id).unwrap().encode();
        let payload = CheckPayload::parse(&params, &text).unwrap();
        let spec_script = Address::from_base58(&params, &record.address).unwrap().script_pubkey();
        let utxos = f.wallet.watched_outputs(&spec_script);
        let payee = Address::p2pkh(&params, &KeyPair::generate().public_key_bytes());

        let txid = f
            .service
            .sweep_payload(&payload, &utxos, &payee, date.timestamp() + 60)
            .await
            .unwrap();
        let swept = f.broadcaster.accepted(&txid).await.unwrap();
        assert_eq!(swept.outputs[0].script_pubkey, payee.script_pubkey());
        assert_eq!(f.store.check(record.id).unwrap().unwrap().status, CheckStatus::Spent);
    }

    #[tokio::test]
    async fn test_sweep_bare_key_payload() {
        let f = fixture(0);
        let params = NetworkParams::mainnet();
        let key = KeyPair::generate();
        let bare = CheckPayload::parse(&params, &export_wif(&key, &params).unwrap()).unwrap();
        let payee = Address::p2pkh(&params, &KeyPair::generate().public_key_bytes());

        let locked = LockedOutputSpec::new(&params, 1_800_000_000, &key.public_key_bytes()).unwrap();
        let p2sh_only = vec![Utxo::new(
            OutPoint::new(Txid::from_internal([0x21; 32]), 0),
            TxOut::new(2 * COIN, locked.script_pubkey.clone()),
        )];
        assert!(matches!(
            f.service.sweep_payload(&bare, &p2sh_only, &payee, 0).await,
            Err(CheckError::Transaction(TransactionError::NoSpendableOutputs(_)))
        ));

        let own = vec![Utxo::new(
            OutPoint::new(Txid::from_internal([0x22; 32]), 1),
            TxOut::new(2 * COIN, Address::p2pkh(&params, &key.public_key_bytes()).script_pubkey()),
        )];
        let txid = f.service.sweep_payload(&bare, &own, &payee, 0).await.unwrap();
        let swept = f.broadcaster.accepted(&txid).await.unwrap();
        assert_eq!(swept.inputs[0].previous_output, own[0].outpoint);
        assert_eq!(swept.outputs[0].script_pubkey, payee.script_pubkey());
        assert!(swept.outputs[0].value < 2 * COIN);
    }

    #[tokio::test]
    async fn test_funding_failure_removes_record() {
        let f = fixture(COIN);
        let date = Utc::now() + Duration::seconds(86_400);
        assert!(matches!(
            f.service.create_check(request(date, 5 * COIN)).await,
            Err(CheckError::Transaction(TransactionError::InsufficientFunds { .. }))
        ));
        assert!(f.store.checks().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_and_locked_wallet() {
        let f = fixture(10 * COIN);
        let date = Utc::now() + Duration::seconds(86_400);

        assert!(matches!(
            f.service.create_check(request(date, 0)).await,
            Err(CheckError::InvalidAmount(_))
        ));
        assert!(matches!(
            f.service.create_check(request(date, u64::MAX - 1)).await,
            Err(CheckError::InvalidAmount(_))
        ));
        let ancient = DateTime::<Utc>::from_timestamp(1_000, 0).unwrap();
        assert!(matches!(
            f.service.create_check(request(ancient, COIN)).await,
            Err(CheckError::InvalidLocktime(_))
        ));

        f.wallet.keys().lock();
        let err = f.service.create_check(request(date, COIN)).await.unwrap_err();
        assert!(matches!(err, CheckError::Transaction(TransactionError::WalletLocked)));
        assert_ne!(
            err.to_string(),
            CheckError::Transaction(TransactionError::InsufficientFunds { available: 0, required: 1 }).to_string()
        );
        assert!(f.store.checks().unwrap().is_empty());
    }
}
