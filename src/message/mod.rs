//! Signed messages
//!
//! Sign arbitrary text with a wallet key so that anyone holding the
//! address can check authorship without a transaction.

pub mod signer;

use thiserror::Error;

use crate::crypto::KeyError;

pub use signer::{
    content_fingerprint, decode_signature, hash_message, sign_content, sign_message,
    verify_message, DigestAlgorithm, SignedMessage, COMPACT_SIGNATURE_LEN,
};

/// Errors from signing or verifying messages
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("No recovery id reproduces the signing key")]
    RecoveryIdNotFound,
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}
