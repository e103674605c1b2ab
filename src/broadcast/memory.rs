//! In-process broadcaster

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{BroadcastError, Broadcaster};
use crate::transaction::{Transaction, Txid};

#[derive(Default)]
struct State {
    accepted: HashMap<Txid, Transaction>,
    offline: bool,
    reject_next: Option<String>,
}

/// Broadcaster that keeps accepted transactions in memory
///
/// Can be switched offline or told to reject the next submission.
#[derive(Default)]
pub struct MemoryBroadcaster {
    state: Mutex<State>,
}

impl MemoryBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn reject_next(&self, reason: &str) {
        self.state.lock().await.reject_next = Some(reason.to_string());
    }

    pub async fn accepted(&self, txid: &Txid) -> Option<Transaction> {
        self.state.lock().await.accepted.get(txid).cloned()
    }

    pub async fn accepted_count(&self) -> usize {
        self.state.lock().await.accepted.len()
    }
}

#[async_trait]
impl Broadcaster for MemoryBroadcaster {
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, BroadcastError> {
        let mut state = self.state.lock().await;
        if state.offline {
            return Err(BroadcastError::NetworkUnavailable("broadcaster offline".to_string()));
        }
        if let Some(reason) = state.reject_next.take() {
            return Err(BroadcastError::BroadcastRejected(reason));
        }
        let txid = tx.txid();
        // resubmitting an accepted transaction is a no-op
        state.accepted.entry(txid).or_insert_with(|| tx.clone());
        Ok(txid)
    }
}
