//! Bare M-of-N CHECKMULTISIG redeem scripts
//!
//! `OP_M <pk1> .. <pkN> OP_N OP_CHECKMULTISIG`. Public keys keep their
//! given order: the same keys in a different order produce a different
//! script, and therefore a different address.

use std::collections::HashSet;
use std::fmt;

use super::address::Address;
use super::builder::{Instruction, Script, MAX_REDEEM_SCRIPT_SIZE};
use super::opcodes::{self, OP_CHECKMULTISIG};
use super::ScriptError;
use crate::crypto::keys::parse_public_key;
use crate::params::NetworkParams;

/// Maximum number of keys in a standard multisig script
pub const MAX_MULTISIG_KEYS: usize = 15;

/// Build an M-of-N redeem script
pub fn build_multisig_script(required: usize, pubkeys: &[Vec<u8>]) -> Result<Script, ScriptError> {
    let total = pubkeys.len();
    if total > MAX_MULTISIG_KEYS {
        return Err(ScriptError::InvalidMultisigParams(format!(
            "{} keys exceeds the maximum of {}",
            total, MAX_MULTISIG_KEYS
        )));
    }
    if required < 1 || required > total {
        return Err(ScriptError::InvalidMultisigParams(format!(
            "threshold {} is not within 1..={}",
            required, total
        )));
    }

    let mut seen = HashSet::new();
    for (i, key) in pubkeys.iter().enumerate() {
        parse_public_key(key).map_err(|_| {
            ScriptError::InvalidMultisigParams(format!("public key {} is not a valid key", i))
        })?;
        if !seen.insert(key.as_slice()) {
            return Err(ScriptError::InvalidMultisigParams(format!(
                "public key {} is repeated",
                i
            )));
        }
    }

    // Both bounds are within 1..=15 at this point
    let m = opcodes::small_int(required as u8)
        .ok_or_else(|| ScriptError::InvalidMultisigParams("threshold".to_string()))?;
    let n = opcodes::small_int(total as u8)
        .ok_or_else(|| ScriptError::InvalidMultisigParams("key count".to_string()))?;

    let mut builder = Script::builder().op(m);
    for key in pubkeys {
        builder = builder.push_data(key);
    }
    let script = builder.op(n).op(OP_CHECKMULTISIG).build();

    if script.len() > MAX_REDEEM_SCRIPT_SIZE {
        return Err(ScriptError::ScriptTooLarge(script.len()));
    }
    Ok(script)
}

/// Recover `(M, pubkeys)` from a multisig redeem script
pub fn parse_multisig_script(script: &Script) -> Result<(usize, Vec<Vec<u8>>), ScriptError> {
    let not_multisig = || ScriptError::InvalidScript("not a multisig redeem script".to_string());
    let instructions = script.instructions()?;
    let [first, keys @ .., n_op, Instruction::Op(OP_CHECKMULTISIG)] = instructions.as_slice() else {
        return Err(not_multisig());
    };

    let required = first.small_int().ok_or_else(not_multisig)? as usize;
    let total = n_op.small_int().ok_or_else(not_multisig)? as usize;
    if total != keys.len() || required < 1 || required > total {
        return Err(not_multisig());
    }

    let pubkeys = keys
        .iter()
        .map(|ins| match ins {
            Instruction::Push(key) => Ok(key.clone()),
            Instruction::Op(_) => Err(not_multisig()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((required, pubkeys))
}

/// A multisig arrangement: threshold, ordered keys, script and address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigSpec {
    pub required: usize,
    pub pubkeys: Vec<Vec<u8>>,
    pub redeem_script: Script,
    pub address: Address,
}

impl MultisigSpec {
    pub fn new(
        params: &NetworkParams,
        required: usize,
        pubkeys: Vec<Vec<u8>>,
    ) -> Result<Self, ScriptError> {
        let redeem_script = build_multisig_script(required, &pubkeys)?;
        let address = Address::p2sh(params, &redeem_script);
        Ok(Self {
            required,
            pubkeys,
            redeem_script,
            address,
        })
    }

    /// Rebuild from a redeem script received from a cosigner
    pub fn from_redeem_script(params: &NetworkParams, redeem_script: Script) -> Result<Self, ScriptError> {
        let (required, pubkeys) = parse_multisig_script(&redeem_script)?;
        let rebuilt = build_multisig_script(required, &pubkeys)?;
        if rebuilt != redeem_script {
            return Err(ScriptError::InvalidScript(
                "redeem script is not in canonical form".to_string(),
            ));
        }
        Ok(Self {
            address: Address::p2sh(params, &redeem_script),
            required,
            pubkeys,
            redeem_script,
        })
    }

    pub fn total(&self) -> usize {
        self.pubkeys.len()
    }

    /// Position of a public key in the script
    pub fn position_of(&self, pubkey: &[u8]) -> Option<usize> {
        self.pubkeys.iter().position(|k| k.as_slice() == pubkey)
    }

    pub fn script_pubkey(&self) -> Script {
        self.address.script_pubkey()
    }

    /// Get a human-readable description
    pub fn description(&self) -> String {
        format!("{}-of-{} multisig", self.required, self.total())
    }
}

impl fmt::Display for MultisigSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.description(), self.address)
    }
}
