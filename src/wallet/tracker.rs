//! Relevance tracking
//!
//! The tracker is the wallet-side view of the chain: which output scripts
//! matter to us and which transactions we have produced. Broadcast always
//! registers a transaction here first so the wallet reflects the spend even
//! if the network never confirms it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use thiserror::Error;

use crate::script::Script;
use crate::transaction::{Transaction, Txid};

/// Errors from a relevance tracker
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("Tracker unavailable: {0}")]
    Unavailable(String),
}

/// Wallet-side registry of watched scripts and pending transactions
pub trait RelevanceTracker: Send + Sync {
    /// Start treating outputs to `script_pubkey` as relevant
    fn watch_script(&self, script_pubkey: &Script) -> Result<(), TrackerError>;

    fn is_watched(&self, script_pubkey: &Script) -> bool;

    /// Record a transaction we are about to broadcast
    fn register_transaction(&self, tx: &Transaction) -> Result<(), TrackerError>;
}

/// In-memory tracker for tools and tests that have no wallet
#[derive(Default)]
pub struct MemoryTracker {
    scripts: RwLock<HashSet<Script>>,
    transactions: RwLock<HashMap<Txid, Transaction>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watched_count(&self) -> usize {
        self.scripts.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.transactions
            .read()
            .ok()
            .and_then(|txs| txs.get(txid).cloned())
    }
}

impl RelevanceTracker for MemoryTracker {
    fn watch_script(&self, script_pubkey: &Script) -> Result<(), TrackerError> {
        self.scripts
            .write()
            .map_err(|_| TrackerError::Unavailable("script set poisoned".to_string()))?
            .insert(script_pubkey.clone());
        Ok(())
    }

    fn is_watched(&self, script_pubkey: &Script) -> bool {
        self.scripts
            .read()
            .map(|s| s.contains(script_pubkey))
            .unwrap_or(false)
    }

    fn register_transaction(&self, tx: &Transaction) -> Result<(), TrackerError> {
        self.transactions
            .write()
            .map_err(|_| TrackerError::Unavailable("transaction set poisoned".to_string()))?
            .insert(tx.txid(), tx.clone());
        Ok(())
    }
}
