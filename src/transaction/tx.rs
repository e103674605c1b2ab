//! Legacy transaction model and consensus serialization
//!
//! Implements:
//! - Wire encoding (version, inputs, outputs, locktime)
//! - Transaction ids (double SHA-256, displayed byte-reversed)
//! - Legacy signature hashing for SIGHASH_ALL
//! - A builder for assembling inputs and outputs

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::utxo::Utxo;
use super::TransactionError;
use crate::codec::{write_var_bytes, write_varint, Reader};
use crate::crypto::hash::double_sha256;
use crate::script::Script;

// =============================================================================
// Constants
// =============================================================================

/// Transaction version
pub const TX_VERSION: i32 = 1;

/// Sequence number that disables locktime checks for the input
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Highest sequence number that keeps nLockTime enforced
pub const SEQUENCE_LOCKTIME_ENABLED: u32 = 0xFFFF_FFFE;

// =============================================================================
// Signature Hash Types
// =============================================================================

/// Signature hash type appended to every signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SigHashType {
    /// Sign all inputs and all outputs
    All = 0x01,
}

impl SigHashType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(SigHashType::All),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

// =============================================================================
// Transaction Ids and Outpoints
// =============================================================================

/// Double SHA-256 of a serialized transaction, in internal byte order
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid([u8; 32]);

impl Txid {
    pub fn from_internal(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_internal(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.0;
        display.reverse();
        f.write_str(&hex::encode(display))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self)
    }
}

impl FromStr for Txid {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
        let mut internal: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TransactionError::InvalidHex(format!("txid must be 32 bytes, got {}", bytes.len())))?;
        internal.reverse();
        Ok(Self(internal))
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

// =============================================================================
// Inputs and Outputs
// =============================================================================

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    /// Unsigned input spending `previous_output`
    pub fn new(previous_output: OutPoint, sequence: u32) -> Self {
        Self {
            previous_output,
            script_sig: Script::new(),
            sequence,
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.script_sig.is_empty()
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: u64,
    pub script_pubkey: Script,
}

impl TxOut {
    pub fn new(value: u64, script_pubkey: Script) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A legacy (pre-segwit) transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(inputs: Vec<TxIn>, outputs: Vec<TxOut>) -> Self {
        Self {
            version: TX_VERSION,
            inputs,
            outputs,
            lock_time: 0,
        }
    }

    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::new()
    }

    /// Consensus serialization
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(10 + self.inputs.len() * 150 + self.outputs.len() * 34);
        buf.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(input.previous_output.txid.as_internal());
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_var_bytes(&mut buf, input.script_sig.as_bytes());
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(&mut buf, output.script_pubkey.as_bytes());
        }

        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, TransactionError> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_i32_le()?;

        let input_count = reader.read_varint()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let txid = Txid::from_internal(reader.read_array()?);
            let vout = reader.read_u32_le()?;
            let script_sig = Script::from_bytes(reader.read_var_bytes()?.to_vec());
            let sequence = reader.read_u32_le()?;
            inputs.push(TxIn {
                previous_output: OutPoint::new(txid, vout),
                script_sig,
                sequence,
            });
        }

        let output_count = reader.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = reader.read_u64_le()?;
            let script_pubkey = Script::from_bytes(reader.read_var_bytes()?.to_vec());
            outputs.push(TxOut::new(value, script_pubkey));
        }

        let lock_time = reader.read_u32_le()?;
        reader.finish()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|e| TransactionError::InvalidHex(e.to_string()))?;
        Self::deserialize(&bytes)
    }

    pub fn txid(&self) -> Txid {
        Txid::from_internal(double_sha256(&self.serialize()))
    }

    pub fn size(&self) -> usize {
        self.serialize().len()
    }

    /// Get total output value
    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn is_fully_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(TxIn::is_signed)
    }

    /// Digest signed by the key spending input `index`
    ///
    /// Every scriptSig is blanked, input `index` carries `subscript` (the
    /// redeem script for P2SH, the scriptPubKey otherwise) and the hash type
    /// is appended as a little-endian u32.
    pub fn signature_hash(
        &self,
        index: usize,
        subscript: &Script,
        sighash_type: SigHashType,
    ) -> Result<[u8; 32], TransactionError> {
        if index >= self.inputs.len() {
            return Err(TransactionError::InputOutOfRange {
                index,
                count: self.inputs.len(),
            });
        }

        let mut copy = self.clone();
        for (i, input) in copy.inputs.iter_mut().enumerate() {
            input.script_sig = if i == index {
                subscript.clone()
            } else {
                Script::new()
            };
        }

        let mut preimage = copy.serialize();
        preimage.extend_from_slice(&sighash_type.as_u32().to_le_bytes());
        Ok(double_sha256(&preimage))
    }
}

// =============================================================================
// Transaction Builder
// =============================================================================

/// Builder for constructing transactions
pub struct TransactionBuilder {
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
    lock_time: u32,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// Spend a UTXO with a final sequence number
    pub fn add_input(self, utxo: &Utxo) -> Self {
        self.add_input_with_sequence(utxo, SEQUENCE_FINAL)
    }

    pub fn add_input_with_sequence(mut self, utxo: &Utxo, sequence: u32) -> Self {
        self.inputs.push(TxIn::new(utxo.outpoint, sequence));
        self
    }

    pub fn add_output(mut self, script_pubkey: Script, value: u64) -> Self {
        self.outputs.push(TxOut::new(value, script_pubkey));
        self
    }

    /// Set nLockTime; inputs must use `SEQUENCE_LOCKTIME_ENABLED` for it to apply
    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    pub fn build(self) -> Transaction {
        Transaction {
            version: TX_VERSION,
            inputs: self.inputs,
            outputs: self.outputs,
            lock_time: self.lock_time,
        }
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
