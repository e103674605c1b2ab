//! Multi-signature signature collection
//!
//! Cosigners each sign the unsigned spend template produced by the
//! transaction assembler; the collector verifies, orders and merges their
//! signatures into a redeemable P2SH spend.
//!
//! # Example
//!
//! ```ignore
//! use doge_vault::multisig::{sign_input, MultisigSessions};
//!
//! let sessions = MultisigSessions::new();
//! let id = sessions.open(spec.clone(), spend.clone()).await;
//!
//! // each cosigner signs input 0 over the redeem script
//! let partial = sign_input(&spend.transaction, 0, &spec.redeem_script, &key)?;
//! sessions.submit(&id, partial).await?;
//!
//! // once every input is fully signed
//! let tx = sessions.finalize(&id).await?;
//! ```

pub mod collector;
pub mod manager;
pub mod session;

use thiserror::Error;

use crate::crypto::KeyError;
use crate::script::ScriptError;
use crate::transaction::TransactionError;

pub use collector::{
    assemble_input, assemble_script_sig, sign_all_inputs, sign_input, verify_partial,
    PartialSignature,
};
pub use manager::{MultisigSessions, SessionSummary};
pub use session::{InputState, MultisigSession, SessionStatus};

/// Multisig signing errors
#[derive(Error, Debug)]
pub enum MultisigError {
    #[error("Signature count mismatch: have {have} valid signatures, need {need}")]
    SignatureCountMismatch { have: usize, need: usize },
    #[error("Invalid partial signature: {0}")]
    InvalidPartialSignature(String),
    #[error("Malformed partial signature: {0}")]
    MalformedPartial(String),
    #[error("Input {input} already signed by {pubkey}")]
    AlreadySigned { input: usize, pubkey: String },
    #[error("Input {0} already has every required signature")]
    InputComplete(usize),
    #[error("Input {index} out of range ({count} inputs)")]
    InputOutOfRange { index: usize, count: usize },
    #[error("Signing session not found: {0}")]
    SessionNotFound(String),
    #[error("Signing session closed: broadcast as {0}")]
    SessionClosed(String),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}
