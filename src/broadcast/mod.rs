//! Transaction broadcast
//!
//! The network itself sits behind the [`Broadcaster`] trait. The coordinator
//! registers each transaction with the wallet's relevance tracker before
//! handing it to the network, then records the txid on the record that
//! produced it.

pub mod coordinator;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::StorageError;
use crate::transaction::{Transaction, Txid};
use crate::wallet::TrackerError;

pub use coordinator::{BroadcastCoordinator, BroadcastOutcome, BroadcastStatus};
pub use memory::MemoryBroadcaster;

/// Broadcast errors
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Broadcast rejected by the network: {0}")]
    BroadcastRejected(String),
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),
    #[error("Could not register transaction locally: {0}")]
    Registration(#[from] TrackerError),
    #[error("Broadcast accepted but the record was not updated: {0}")]
    Bookkeeping(#[from] StorageError),
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),
}

/// Network collaborator that relays transactions
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit a signed transaction, resolving to the txid the network accepted
    async fn broadcast(&self, tx: &Transaction) -> Result<Txid, BroadcastError>;
}
