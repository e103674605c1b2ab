//! Hashed time-locked contracts
//!
//! ```text
//! OP_IF
//!     OP_SHA256 <secret_hash> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <recipient_pkh> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ELSE
//!     <locktime> OP_CHECKLOCKTIMEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <refund_pkh> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! The recipient claims by revealing the preimage; the sender takes the
//! funds back once `locktime` has passed.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::address::Address;
use super::builder::Script;
use super::opcodes::*;
use super::ScriptError;
use crate::crypto::hash::sha256;
use crate::params::NetworkParams;

/// Length of generated preimages
pub const SECRET_LEN: usize = 32;

/// Generate a random preimage
pub fn generate_secret() -> Zeroizing<[u8; SECRET_LEN]> {
    let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
    OsRng.fill_bytes(&mut secret[..]);
    secret
}

/// SHA-256 commitment to a preimage
pub fn secret_hash(secret: &[u8]) -> [u8; 32] {
    sha256(secret)
}

pub fn verify_secret(secret: &[u8], expected_hash: &[u8; 32]) -> bool {
    secret_hash(secret) == *expected_hash
}

/// Parameters of one HTLC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcContract {
    pub secret_hash: [u8; 32],
    pub recipient_pubkey_hash: [u8; 20],
    pub refund_pubkey_hash: [u8; 20],
    pub locktime: u32,
}

impl HtlcContract {
    pub fn redeem_script(&self) -> Script {
        Script::builder()
            .op(OP_IF)
            .op(OP_SHA256)
            .push_data(&self.secret_hash)
            .op(OP_EQUALVERIFY)
            .op(OP_DUP)
            .op(OP_HASH160)
            .push_data(&self.recipient_pubkey_hash)
            .op(OP_EQUALVERIFY)
            .op(OP_CHECKSIG)
            .op(OP_ELSE)
            .push_int(self.locktime as i64)
            .op(OP_CHECKLOCKTIMEVERIFY)
            .op(OP_DROP)
            .op(OP_DUP)
            .op(OP_HASH160)
            .push_data(&self.refund_pubkey_hash)
            .op(OP_EQUALVERIFY)
            .op(OP_CHECKSIG)
            .op(OP_ENDIF)
            .build()
    }

    pub fn address(&self, params: &NetworkParams) -> Address {
        Address::p2sh(params, &self.redeem_script())
    }

    /// `<sig> <pubkey> <secret> OP_1 <redeem_script>`
    pub fn claim_script_sig(
        &self,
        signature: &[u8],
        pubkey: &[u8],
        secret: &[u8],
    ) -> Result<Script, ScriptError> {
        if !verify_secret(secret, &self.secret_hash) {
            return Err(ScriptError::InvalidSecret);
        }
        Ok(Script::builder()
            .push_data(signature)
            .push_data(pubkey)
            .push_data(secret)
            .op(OP_1)
            .push_data(self.redeem_script().as_bytes())
            .build())
    }

    /// `<sig> <pubkey> OP_0 <redeem_script>`
    pub fn refund_script_sig(&self, signature: &[u8], pubkey: &[u8]) -> Script {
        Script::builder()
            .push_data(signature)
            .push_data(pubkey)
            .op(OP_0)
            .push_data(self.redeem_script().as_bytes())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::builder::Instruction;

    fn contract(secret: &[u8]) -> HtlcContract {
        HtlcContract {
            secret_hash: secret_hash(secret),
            recipient_pubkey_hash: [1u8; 20],
            refund_pubkey_hash: [2u8; 20],
            locktime: 1_700_000_000,
        }
    }

    #[test]
    fn test_script_structure() {
        let secret = generate_secret();
        let script = contract(&secret[..]).redeem_script();
        let ins = script.instructions().unwrap();
        assert_eq!(ins.first(), Some(&Instruction::Op(OP_IF)));
        assert_eq!(ins.last(), Some(&Instruction::Op(OP_ENDIF)));
        assert!(ins.contains(&Instruction::Op(OP_CHECKLOCKTIMEVERIFY)));
        assert!(ins.contains(&Instruction::Push(secret_hash(&secret[..]).to_vec())));
    }

    #[test]
    fn test_claim_requires_matching_secret() {
        let secret = generate_secret();
        let htlc = contract(&secret[..]);
        assert!(htlc.claim_script_sig(&[0x30], &[0x02; 33], &secret[..]).is_ok());
        assert!(matches!(
            htlc.claim_script_sig(&[0x30], &[0x02; 33], b"wrong"),
            Err(ScriptError::InvalidSecret)
        ));
    }

    #[test]
    fn test_refund_selects_else_branch() {
        let htlc = contract(b"preimage");
        let script_sig = htlc.refund_script_sig(&[0x30, 0x01], &[0x02; 33]);
        let ins = script_sig.instructions().unwrap();
        assert_eq!(ins[2], Instruction::Op(OP_0));
        assert_eq!(
            ins[3],
            Instruction::Push(htlc.redeem_script().into_bytes())
        );
    }

    #[test]
    fn test_secrets_are_random() {
        assert_ne!(*generate_secret(), *generate_secret());
    }
}
