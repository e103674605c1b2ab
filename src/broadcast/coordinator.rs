//! Broadcast coordination

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BroadcastError, Broadcaster};
use crate::storage::{RecordRef, RecordStore};
use crate::transaction::{Transaction, Txid};
use crate::wallet::RelevanceTracker;

/// Accepted outcomes kept for lookup before the oldest are dropped
pub const DEFAULT_SETTLED_LIMIT: usize = 256;

/// Result of the latest attempt for a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastStatus {
    /// Registered locally, attempt not yet resolved
    Pending,
    Accepted,
    Rejected(String),
    /// The network could not be reached
    Unreachable(String),
}

/// Bookkeeping for one transaction across attempts
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    pub txid: Txid,
    pub transaction: Transaction,
    pub origin: Option<RecordRef>,
    pub status: BroadcastStatus,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

/// Registers, broadcasts and records transactions
pub struct BroadcastCoordinator {
    broadcaster: Arc<dyn Broadcaster>,
    tracker: Arc<dyn RelevanceTracker>,
    store: Arc<dyn RecordStore>,
    outcomes: RwLock<HashMap<Txid, BroadcastOutcome>>,
    settled_limit: usize,
}

impl BroadcastCoordinator {
    pub fn new(
        broadcaster: Arc<dyn Broadcaster>,
        tracker: Arc<dyn RelevanceTracker>,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            broadcaster,
            tracker,
            store,
            outcomes: RwLock::new(HashMap::new()),
            settled_limit: DEFAULT_SETTLED_LIMIT,
        }
    }

    /// Number of accepted outcomes to keep; unaccepted ones are always kept
    pub fn with_settled_limit(mut self, limit: usize) -> Self {
        self.settled_limit = limit;
        self
    }

    /// Broadcast `tx` once
    ///
    /// The transaction is registered with the tracker first. On acceptance
    /// its txid is written to `origin`; on failure the record is untouched
    /// and the error is returned without retrying.
    pub async fn broadcast(
        &self,
        tx: &Transaction,
        origin: Option<RecordRef>,
    ) -> Result<Txid, BroadcastError> {
        let txid = tx.txid();
        self.tracker.register_transaction(tx)?;
        self.begin_attempt(tx, origin).await;

        let result = self.broadcaster.broadcast(tx).await;
        let status = match &result {
            Ok(_) => BroadcastStatus::Accepted,
            Err(BroadcastError::BroadcastRejected(reason)) => BroadcastStatus::Rejected(reason.clone()),
            Err(e) => BroadcastStatus::Unreachable(e.to_string()),
        };
        self.finish_attempt(&txid, status).await;

        match result {
            Ok(accepted) => {
                if accepted != txid {
                    log::warn!("Network reported txid {} for {}", accepted, txid);
                }
                log::info!("Broadcast {} accepted", txid);
                if let Some(origin) = origin {
                    self.store.set_transaction_hash(origin, &txid.to_string())?;
                    log::debug!("Recorded {} on {}", txid, origin);
                }
                Ok(txid)
            }
            Err(e) => {
                log::warn!("Broadcast {} failed: {}", txid, e);
                Err(e)
            }
        }
    }

    /// Broadcast a previously attempted transaction again
    pub async fn retry(&self, txid: &Txid) -> Result<Txid, BroadcastError> {
        let (tx, origin) = {
            let outcomes = self.outcomes.read().await;
            let outcome = outcomes
                .get(txid)
                .ok_or_else(|| BroadcastError::UnknownTransaction(txid.to_string()))?;
            (outcome.transaction.clone(), outcome.origin)
        };
        self.broadcast(&tx, origin).await
    }

    pub async fn outcome(&self, txid: &Txid) -> Option<BroadcastOutcome> {
        self.outcomes.read().await.get(txid).cloned()
    }

    /// Transactions registered locally whose latest attempt was not accepted
    pub async fn pending(&self) -> Vec<BroadcastOutcome> {
        let mut pending: Vec<BroadcastOutcome> = self
            .outcomes
            .read()
            .await
            .values()
            .filter(|o| o.status != BroadcastStatus::Accepted)
            .cloned()
            .collect();
        pending.sort_by_key(|o| o.updated_at);
        pending
    }

    async fn begin_attempt(&self, tx: &Transaction, origin: Option<RecordRef>) {
        let txid = tx.txid();
        let mut outcomes = self.outcomes.write().await;
        let outcome = outcomes.entry(txid).or_insert_with(|| BroadcastOutcome {
            txid,
            transaction: tx.clone(),
            origin,
            status: BroadcastStatus::Pending,
            attempts: 0,
            updated_at: Utc::now(),
        });
        outcome.attempts += 1;
        outcome.status = BroadcastStatus::Pending;
        outcome.updated_at = Utc::now();
        if origin.is_some() {
            outcome.origin = origin;
        }
    }

    /// Drop every accepted outcome, returning how many were removed
    pub async fn prune_accepted(&self) -> usize {
        let mut outcomes = self.outcomes.write().await;
        let before = outcomes.len();
        outcomes.retain(|_, o| o.status != BroadcastStatus::Accepted);
        before - outcomes.len()
    }

    async fn finish_attempt(&self, txid: &Txid, status: BroadcastStatus) {
        let mut outcomes = self.outcomes.write().await;
        if let Some(outcome) = outcomes.get_mut(txid) {
            outcome.status = status;
            outcome.updated_at = Utc::now();
        }

        let mut settled: Vec<(DateTime<Utc>, Txid)> = outcomes
            .values()
            .filter(|o| o.status == BroadcastStatus::Accepted)
            .map(|o| (o.updated_at, o.txid))
            .collect();
        if settled.len() > self.settled_limit {
            settled.sort_by_key(|(updated_at, _)| *updated_at);
            let excess = settled.len() - self.settled_limit;
            for (_, txid) in settled.into_iter().take(excess) {
                outcomes.remove(&txid);
            }
            log::debug!("Dropped {} settled broadcast outcomes", excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::MemoryBroadcaster;
    use crate::script::Script;
    use crate::storage::{MemoryRecordStore, NewCheck};
    use crate::transaction::{OutPoint, TxIn, TxOut, SEQUENCE_FINAL};
    use crate::wallet::MemoryTracker;

    struct Fixture {
        broadcaster: Arc<MemoryBroadcaster>,
        tracker: Arc<MemoryTracker>,
        store: Arc<MemoryRecordStore>,
        coordinator: BroadcastCoordinator,
    }

    fn fixture() -> Fixture {
        let broadcaster = Arc::new(MemoryBroadcaster::new());
        let tracker = Arc::new(MemoryTracker::new());
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = BroadcastCoordinator::new(broadcaster.clone(), tracker.clone(), store.clone());
        Fixture {
            broadcaster,
            tracker,
            store,
            coordinator,
        }
    }

    fn transaction() -> Transaction {
        spending(0)
    }

    fn spending(vout: u32) -> Transaction {
        Transaction::new(
            vec![TxIn::new(OutPoint::new(Txid::from_internal([1u8; 32]), vout), SEQUENCE_FINAL)],
            vec![TxOut::new(1_000_000, Script::from_bytes(vec![0x51]))],
        )
    }

    fn check(store: &MemoryRecordStore) -> RecordRef {
        let record = store
            .insert_check(NewCheck {
                pay_to: "Alice".to_string(),
                date: Utc::now(),
                expiration_date: None,
                amount: 1_000_000,
                memo: String::new(),
                signature: "Bob".to_string(),
                address: "9x".to_string(),
                derived_key: "Q".to_string(),
                locktime: 1_800_000_000,
                redeem_script: "00".to_string(),
            })
            .unwrap();
        RecordRef::Check(record.id)
    }

    #[tokio::test]
    async fn test_broadcast_records_txid() {
        let f = fixture();
        let origin = check(&f.store);
        let tx = transaction();

        let txid = f.coordinator.broadcast(&tx, Some(origin)).await.unwrap();
        assert_eq!(txid, tx.txid());
        assert!(f.tracker.transaction(&txid).is_some());
        assert!(f.broadcaster.accepted(&txid).await.is_some());

        let RecordRef::Check(id) = origin else { unreachable!() };
        let record = f.store.check(id).unwrap().unwrap();
        assert_eq!(record.transaction_hash, Some(txid.to_string()));
        assert!(f.coordinator.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_failure_registers_but_leaves_record() {
        let f = fixture();
        let origin = check(&f.store);
        let tx = transaction();
        f.broadcaster.set_offline(true).await;

        let err = f.coordinator.broadcast(&tx, Some(origin)).await.unwrap_err();
        assert!(matches!(err, BroadcastError::NetworkUnavailable(_)));
        // still discoverable locally
        assert!(f.tracker.transaction(&tx.txid()).is_some());

        let RecordRef::Check(id) = origin else { unreachable!() };
        assert!(f.store.check(id).unwrap().unwrap().transaction_hash.is_none());

        let pending = f.coordinator.pending().await;
        assert_eq!(pending.len(), 1);
        assert!(matches!(pending[0].status, BroadcastStatus::Unreachable(_)));

        f.broadcaster.set_offline(false).await;
        f.coordinator.retry(&tx.txid()).await.unwrap();
        let outcome = f.coordinator.outcome(&tx.txid()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.status, BroadcastStatus::Accepted);
        assert!(f.store.check(id).unwrap().unwrap().transaction_hash.is_some());
    }

    #[tokio::test]
    async fn test_rejection_is_typed() {
        let f = fixture();
        f.broadcaster.reject_next("bad-txns-inputs-missingorspent").await;
        let tx = transaction();
        assert!(matches!(
            f.coordinator.broadcast(&tx, None).await,
            Err(BroadcastError::BroadcastRejected(reason)) if reason.contains("missingorspent")
        ));
        assert_eq!(
            f.coordinator.outcome(&tx.txid()).await.unwrap().status,
            BroadcastStatus::Rejected("bad-txns-inputs-missingorspent".to_string())
        );
        assert!(matches!(
            f.coordinator.retry(&Txid::default()).await,
            Err(BroadcastError::UnknownTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_settled_outcomes_are_bounded() {
        let broadcaster = Arc::new(MemoryBroadcaster::new());
        let coordinator = BroadcastCoordinator::new(
            broadcaster.clone(),
            Arc::new(MemoryTracker::new()),
            Arc::new(MemoryRecordStore::new()),
        )
        .with_settled_limit(2);

        broadcaster.set_offline(true).await;
        let stuck = spending(9);
        assert!(coordinator.broadcast(&stuck, None).await.is_err());
        broadcaster.set_offline(false).await;

        let txs: Vec<Transaction> = (0..4).map(spending).collect();
        for tx in &txs {
            coordinator.broadcast(tx, None).await.unwrap();
        }

        let mut kept = Vec::new();
        for tx in &txs {
            kept.push(coordinator.outcome(&tx.txid()).await.is_some());
        }
        assert_eq!(kept.iter().filter(|k| **k).count(), 2);
        // unaccepted transactions stay available for retry
        assert!(coordinator.outcome(&stuck.txid()).await.is_some());
        assert_eq!(coordinator.pending().await.len(), 1);

        assert_eq!(coordinator.prune_accepted().await, 2);
        assert_eq!(coordinator.pending().await.len(), 1);
        for tx in &txs {
            assert!(coordinator.outcome(&tx.txid()).await.is_none());
        }
    }
}
