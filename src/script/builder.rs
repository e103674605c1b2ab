//! Script byte strings and their construction
//!
//! `Script` is an opaque byte string with helpers for parsing it back into
//! instructions. `ScriptBuilder` appends opcodes, minimal data pushes and
//! minimally encoded numbers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::opcodes::{self, *};
use super::ScriptError;
use crate::crypto::hash::hash160;

/// Standard relay limit for a P2SH redeem script
pub const MAX_REDEEM_SCRIPT_SIZE: usize = 520;

// =============================================================================
// Script
// =============================================================================

/// A serialized script
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, ScriptError> {
        hex::decode(hex_str.trim())
            .map(Self)
            .map_err(|e| ScriptError::InvalidScript(format!("bad hex: {}", e)))
    }

    pub fn builder() -> ScriptBuilder {
        ScriptBuilder::new()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// HASH160 of the script, as committed to by a P2SH output
    pub fn script_hash(&self) -> [u8; 20] {
        hash160(&self.0)
    }

    /// Parse into instructions
    pub fn instructions(&self) -> Result<Vec<Instruction>, ScriptError> {
        let mut out = Vec::new();
        let bytes = &self.0;
        let mut pos = 0;

        while pos < bytes.len() {
            let opcode = bytes[pos];
            pos += 1;

            let push_len = match opcode {
                0x01..=0x4b => Some(opcode as usize),
                OP_PUSHDATA1 => Some(read_len(bytes, &mut pos, 1)?),
                OP_PUSHDATA2 => Some(read_len(bytes, &mut pos, 2)?),
                OP_PUSHDATA4 => Some(read_len(bytes, &mut pos, 4)?),
                _ => None,
            };

            match push_len {
                Some(len) => {
                    let end = pos
                        .checked_add(len)
                        .filter(|end| *end <= bytes.len())
                        .ok_or_else(|| {
                            ScriptError::InvalidScript(format!(
                                "push of {} bytes at offset {} runs past end",
                                len, pos
                            ))
                        })?;
                    out.push(Instruction::Push(bytes[pos..end].to_vec()));
                    pos = end;
                }
                None => out.push(Instruction::Op(opcode)),
            }
        }
        Ok(out)
    }

    /// `OP_HASH160 <20 bytes> OP_EQUAL`
    pub fn p2sh_hash(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 23 && b[0] == OP_HASH160 && b[1] == 0x14 && b[22] == OP_EQUAL {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[2..22]);
            Some(hash)
        } else {
            None
        }
    }

    /// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh_hash(&self) -> Option<[u8; 20]> {
        let b = &self.0;
        if b.len() == 25
            && b[0] == OP_DUP
            && b[1] == OP_HASH160
            && b[2] == 0x14
            && b[23] == OP_EQUALVERIFY
            && b[24] == OP_CHECKSIG
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&b[3..23]);
            Some(hash)
        } else {
            None
        }
    }

    /// Disassembly, e.g. `OP_DUP OP_HASH160 89ab.. OP_EQUALVERIFY OP_CHECKSIG`
    pub fn to_asm(&self) -> String {
        match self.instructions() {
            Ok(instructions) => instructions
                .iter()
                .map(|ins| match ins {
                    Instruction::Push(data) => hex::encode(data),
                    Instruction::Op(op) => match opcodes::decode_small_int(*op) {
                        Some(n) if *op != OP_0 => format!("OP_{}", n),
                        _ => opcodes::name(*op)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("OP_UNKNOWN_0x{:02x}", op)),
                    },
                })
                .collect::<Vec<_>>()
                .join(" "),
            Err(_) => format!("[invalid script {}]", self.to_hex()),
        }
    }
}

fn read_len(bytes: &[u8], pos: &mut usize, width: usize) -> Result<usize, ScriptError> {
    if *pos + width > bytes.len() {
        return Err(ScriptError::InvalidScript(
            "truncated push length".to_string(),
        ));
    }
    let mut len = 0usize;
    for (i, b) in bytes[*pos..*pos + width].iter().enumerate() {
        len |= (*b as usize) << (8 * i);
    }
    *pos += width;
    Ok(len)
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_asm())
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A parsed script element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Op(u8),
    Push(Vec<u8>),
}

impl Instruction {
    /// Small integer value of `OP_0..OP_16`
    pub fn small_int(&self) -> Option<u8> {
        match self {
            Instruction::Op(op) => opcodes::decode_small_int(*op),
            Instruction::Push(_) => None,
        }
    }

    pub fn push_data(&self) -> Option<&[u8]> {
        match self {
            Instruction::Push(data) => Some(data),
            Instruction::Op(OP_0) => Some(&[] as &[u8]),
            Instruction::Op(_) => None,
        }
    }
}

// =============================================================================
// Script Builder
// =============================================================================

/// Incremental script construction
#[derive(Debug, Default, Clone)]
pub struct ScriptBuilder {
    bytes: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.bytes.push(opcode);
        self
    }

    /// Push data with the shortest push encoding
    pub fn push_data(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len == 0 {
            self.bytes.push(OP_0);
            return self;
        }
        if len < OP_PUSHDATA1 as usize {
            self.bytes.push(len as u8);
        } else if len <= 0xff {
            self.bytes.push(OP_PUSHDATA1);
            self.bytes.push(len as u8);
        } else if len <= 0xffff {
            self.bytes.push(OP_PUSHDATA2);
            self.bytes.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.bytes.push(OP_PUSHDATA4);
            self.bytes.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.bytes.extend_from_slice(data);
        self
    }

    /// Push an integer, using `OP_0..OP_16`/`OP_1NEGATE` where possible
    pub fn push_int(self, n: i64) -> Self {
        match n {
            -1 => self.op(OP_1NEGATE),
            0..=16 => match opcodes::small_int(n as u8) {
                Some(op) => self.op(op),
                None => self.push_data(&encode_script_num(n)),
            },
            _ => self.push_data(&encode_script_num(n)),
        }
    }

    pub fn build(self) -> Script {
        Script(self.bytes)
    }
}

/// Minimal little-endian sign-magnitude encoding used by script numbers
pub fn encode_script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    if let Some(last) = out.last_mut() {
        if *last & 0x80 != 0 {
            out.push(if negative { 0x80 } else { 0x00 });
        } else if negative {
            *last |= 0x80;
        }
    }
    out
}

/// Inverse of `encode_script_num`
pub fn decode_script_num(bytes: &[u8]) -> Result<i64, ScriptError> {
    if bytes.len() > 8 {
        return Err(ScriptError::InvalidScript(format!(
            "script number of {} bytes",
            bytes.len()
        )));
    }
    let Some((last, _)) = bytes.split_last() else {
        return Ok(0);
    };
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        let b = if i == bytes.len() - 1 { b & 0x7f } else { *b };
        value |= (b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        value = -value;
    }
    Ok(value)
}
