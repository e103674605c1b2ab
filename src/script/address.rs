//! Base58Check addresses for P2PKH and P2SH outputs

use std::fmt;

use super::builder::Script;
use super::opcodes::*;
use super::ScriptError;
use crate::crypto::base58::{decode_check, encode_check};
use crate::crypto::hash::hash160;
use crate::params::NetworkParams;

/// The two standard address types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    /// Pay to Public Key Hash
    P2pkh,
    /// Pay to Script Hash
    P2sh,
}

/// A decoded address: version byte plus 20-byte hash
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    kind: AddressKind,
    version: u8,
    hash: [u8; 20],
}

impl Address {
    /// Address of a public key
    pub fn p2pkh(params: &NetworkParams, public_key: &[u8]) -> Self {
        Self::from_hash(params, AddressKind::P2pkh, hash160(public_key))
    }

    /// Address committing to a redeem script
    pub fn p2sh(params: &NetworkParams, redeem_script: &Script) -> Self {
        Self::from_hash(params, AddressKind::P2sh, redeem_script.script_hash())
    }

    pub fn from_hash(params: &NetworkParams, kind: AddressKind, hash: [u8; 20]) -> Self {
        let version = match kind {
            AddressKind::P2pkh => params.p2pkh_version,
            AddressKind::P2sh => params.p2sh_version,
        };
        Self { kind, version, hash }
    }

    /// Parse a Base58Check address, rejecting other networks' version bytes
    pub fn from_base58(params: &NetworkParams, encoded: &str) -> Result<Self, ScriptError> {
        let decoded = decode_check(encoded)
            .map_err(|e| ScriptError::InvalidAddress(format!("{}: {}", encoded, e)))?;
        if decoded.len() != 21 {
            return Err(ScriptError::InvalidAddress(format!(
                "{}: payload is {} bytes",
                encoded,
                decoded.len()
            )));
        }
        let kind = match decoded[0] {
            v if v == params.p2pkh_version => AddressKind::P2pkh,
            v if v == params.p2sh_version => AddressKind::P2sh,
            v => {
                return Err(ScriptError::InvalidAddress(format!(
                    "{}: version 0x{:02x} is not valid on {}",
                    encoded, v, params.network
                )))
            }
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&decoded[1..]);
        Ok(Self::from_hash(params, kind, hash))
    }

    /// Address paid by a standard output script, if it is one
    pub fn from_script_pubkey(params: &NetworkParams, script_pubkey: &Script) -> Option<Self> {
        if let Some(hash) = script_pubkey.p2pkh_hash() {
            return Some(Self::from_hash(params, AddressKind::P2pkh, hash));
        }
        script_pubkey
            .p2sh_hash()
            .map(|hash| Self::from_hash(params, AddressKind::P2sh, hash))
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn hash(&self) -> &[u8; 20] {
        &self.hash
    }

    /// Output script paying this address
    pub fn script_pubkey(&self) -> Script {
        match self.kind {
            AddressKind::P2pkh => p2pkh_script_pubkey(&self.hash),
            AddressKind::P2sh => p2sh_script_pubkey(&self.hash),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_check(self.version, &self.hash))
    }
}

/// P2SH address of a redeem script
pub fn script_to_p2sh_address(params: &NetworkParams, redeem_script: &Script) -> Address {
    Address::p2sh(params, redeem_script)
}

/// `OP_HASH160 <hash> OP_EQUAL`
pub fn p2sh_script_pubkey(script_hash: &[u8; 20]) -> Script {
    Script::builder()
        .op(OP_HASH160)
        .push_data(script_hash)
        .op(OP_EQUAL)
        .build()
}

/// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script_pubkey(pubkey_hash: &[u8; 20]) -> Script {
    Script::builder()
        .op(OP_DUP)
        .op(OP_HASH160)
        .push_data(pubkey_hash)
        .op(OP_EQUALVERIFY)
        .op(OP_CHECKSIG)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;

    #[test]
    fn test_p2sh_prefixes() {
        let script = Script::builder().op(OP_1).build();
        let mainnet = Address::p2sh(&NetworkParams::mainnet(), &script).to_string();
        assert!(mainnet.starts_with('9') || mainnet.starts_with('A'));
        let testnet = Address::p2sh(&NetworkParams::testnet(), &script).to_string();
        assert!(testnet.starts_with('2'));
    }

    #[test]
    fn test_parse_roundtrip() {
        let params = NetworkParams::mainnet();
        let key = KeyPair::generate();
        let address = Address::p2pkh(&params, &key.public_key_bytes());
        assert_eq!(address.to_string(), key.address(&params));

        let parsed = Address::from_base58(&params, &address.to_string()).unwrap();
        assert_eq!(parsed, address);
        assert_eq!(parsed.kind(), AddressKind::P2pkh);
    }

    #[test]
    fn test_rejects_other_network() {
        let key = KeyPair::generate();
        let testnet_address = key.address(&NetworkParams::testnet());
        assert!(matches!(
            Address::from_base58(&NetworkParams::mainnet(), &testnet_address),
            Err(ScriptError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_script_pubkey_recognized() {
        let params = NetworkParams::mainnet();
        let script = Script::builder().op(OP_1).build();
        let address = script_to_p2sh_address(&params, &script);
        let spk = address.script_pubkey();
        assert_eq!(spk.len(), 23);
        assert_eq!(spk.p2sh_hash(), Some(script.script_hash()));
        assert_eq!(Address::from_script_pubkey(&params, &spk), Some(address));

        let p2pkh = p2pkh_script_pubkey(&[3u8; 20]);
        assert_eq!(p2pkh.p2pkh_hash(), Some([3u8; 20]));
        assert_eq!(p2pkh.p2sh_hash(), None);
    }
}
