//! Absolute time-lock scripts
//!
//! `<locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP <pubkey> OP_CHECKSIG`, paid to
//! through P2SH. The key holder can spend once the chain passes `locktime`.

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::builder::{decode_script_num, Instruction, Script};
use super::opcodes::*;
use super::ScriptError;
use crate::crypto::keys::parse_public_key;
use crate::params::NetworkParams;

/// Build the CLTV redeem script for `pubkey`
pub fn build_cltv_script(locktime: u32, pubkey: &[u8]) -> Result<Script, ScriptError> {
    parse_public_key(pubkey).map_err(|_| ScriptError::InvalidPublicKey)?;
    Ok(Script::builder()
        .push_int(locktime as i64)
        .op(OP_CHECKLOCKTIMEVERIFY)
        .op(OP_DROP)
        .push_data(pubkey)
        .op(OP_CHECKSIG)
        .build())
}

/// Recover `(locktime, pubkey)` from a CLTV redeem script
pub fn parse_cltv_script(script: &Script) -> Result<(u32, Vec<u8>), ScriptError> {
    let instructions = script.instructions()?;
    let [lock, Instruction::Op(OP_CHECKLOCKTIMEVERIFY), Instruction::Op(OP_DROP), Instruction::Push(pubkey), Instruction::Op(OP_CHECKSIG)] =
        instructions.as_slice()
    else {
        return Err(ScriptError::InvalidScript(
            "not a CLTV redeem script".to_string(),
        ));
    };

    let locktime = match lock {
        Instruction::Push(bytes) => decode_script_num(bytes)?,
        other => other.small_int().map(i64::from).ok_or_else(|| {
            ScriptError::InvalidScript("locktime is not a number".to_string())
        })?,
    };
    let locktime = u32::try_from(locktime)
        .map_err(|_| ScriptError::InvalidScript(format!("locktime {} out of range", locktime)))?;
    Ok((locktime, pubkey.clone()))
}

/// A time-locked output: redeem script, its P2SH address and funding state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedOutputSpec {
    pub redeem_script: Script,
    pub script_pubkey: Script,
    /// Base58 P2SH address
    pub address: String,
    /// Hex public key that can spend after `locktime`
    pub unlock_pubkey: String,
    pub locktime: u32,
    /// Funding transaction id; set once, after broadcast is accepted
    transaction_hash: Option<String>,
}

impl LockedOutputSpec {
    pub fn new(params: &NetworkParams, locktime: u32, pubkey: &[u8]) -> Result<Self, ScriptError> {
        let redeem_script = build_cltv_script(locktime, pubkey)?;
        let address = Address::p2sh(params, &redeem_script);
        Ok(Self {
            script_pubkey: address.script_pubkey(),
            address: address.to_string(),
            unlock_pubkey: hex::encode(pubkey),
            redeem_script,
            locktime,
            transaction_hash: None,
        })
    }

    pub fn transaction_hash(&self) -> Option<&str> {
        self.transaction_hash.as_deref()
    }

    /// Record the funding transaction id
    pub fn set_transaction_hash(&mut self, txid: &str) -> Result<(), ScriptError> {
        match &self.transaction_hash {
            Some(existing) if existing != txid => Err(ScriptError::AlreadyFunded(existing.clone())),
            _ => {
                self.transaction_hash = Some(txid.to_string());
                Ok(())
            }
        }
    }

    pub fn is_timestamp_lock(&self, params: &NetworkParams) -> bool {
        params.is_timestamp_locktime(self.locktime)
    }
}
