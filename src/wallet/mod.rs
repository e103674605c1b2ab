//! Wallet module for own funds and relevance tracking

pub mod tracker;
pub mod wallet;

use thiserror::Error;

use crate::crypto::KeyError;

pub use tracker::{MemoryTracker, RelevanceTracker, TrackerError};
pub use wallet::{OwnedUtxo, Wallet, WalletSnapshot};

/// Wallet-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet is locked: unlock it with the wallet seed first")]
    Locked,
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
