//! Cosigner signatures for multisig spend templates
//!
//! Each cosigner signs an input's sighash computed over the redeem script.
//! Signatures travel as text (`input:pubkey:signature`, hex fields) and are
//! merged into `OP_0 <sig>... <redeemScript>` in redeem-script key order.

use chrono::{DateTime, Utc};
use secp256k1::ecdsa::Signature;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::MultisigError;
use crate::crypto::keys::{parse_public_key, verify_digest, KeyPair};
use crate::script::{parse_multisig_script, MultisigSpec, Script};
use crate::transaction::{input_signature, SigHashType, Transaction};

/// One cosigner's signature over one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub input_index: usize,
    /// SEC1 public key of the signer
    pub pubkey: Vec<u8>,
    /// DER signature followed by the hash-type byte
    pub signature: Vec<u8>,
    pub signed_at: DateTime<Utc>,
}

impl PartialSignature {
    pub fn new(input_index: usize, pubkey: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            input_index,
            pubkey,
            signature,
            signed_at: Utc::now(),
        }
    }

    pub fn pubkey_hex(&self) -> String {
        hex::encode(&self.pubkey)
    }
}

impl fmt::Display for PartialSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.input_index,
            hex::encode(&self.pubkey),
            hex::encode(&self.signature)
        )
    }
}

impl FromStr for PartialSignature {
    type Err = MultisigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split(':');
        let (Some(index), Some(pubkey), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(MultisigError::MalformedPartial(
                "expected input:pubkey:signature".to_string(),
            ));
        };

        let input_index = index
            .parse()
            .map_err(|_| MultisigError::MalformedPartial(format!("bad input index {}", index)))?;
        let pubkey = hex::decode(pubkey)
            .map_err(|_| MultisigError::MalformedPartial("pubkey is not hex".to_string()))?;
        let signature = hex::decode(signature)
            .map_err(|_| MultisigError::MalformedPartial("signature is not hex".to_string()))?;
        Ok(Self::new(input_index, pubkey, signature))
    }
}

/// Sign input `input_index` of a spend template as one cosigner
pub fn sign_input(
    unsigned: &Transaction,
    input_index: usize,
    redeem_script: &Script,
    key: &KeyPair,
) -> Result<PartialSignature, MultisigError> {
    let signature = input_signature(unsigned, input_index, redeem_script, key)?;
    Ok(PartialSignature::new(
        input_index,
        key.public_key_bytes(),
        signature,
    ))
}

/// Sign every input of a template with one key
pub fn sign_all_inputs(
    unsigned: &Transaction,
    spec: &MultisigSpec,
    key: &KeyPair,
) -> Result<Vec<PartialSignature>, MultisigError> {
    if spec.position_of(&key.public_key_bytes()).is_none() {
        return Err(MultisigError::InvalidPartialSignature(format!(
            "{} is not a cosigner of {}",
            key.public_key_hex(),
            spec.address
        )));
    }
    (0..unsigned.inputs.len())
        .map(|index| sign_input(unsigned, index, &spec.redeem_script, key))
        .collect()
}

/// Check a partial signature against its claimed key and the input sighash
///
/// Returns the signer's position in the redeem script.
pub fn verify_partial(
    unsigned: &Transaction,
    spec: &MultisigSpec,
    partial: &PartialSignature,
) -> Result<usize, MultisigError> {
    let invalid = |reason: &str| {
        MultisigError::InvalidPartialSignature(format!(
            "input {} from {}: {}",
            partial.input_index,
            partial.pubkey_hex(),
            reason
        ))
    };

    let position = spec
        .position_of(&partial.pubkey)
        .ok_or_else(|| invalid("key is not in the redeem script"))?;
    let pubkey = parse_public_key(&partial.pubkey).map_err(|_| invalid("bad public key"))?;

    let (hash_type, der) = partial
        .signature
        .split_last()
        .ok_or_else(|| invalid("empty signature"))?;
    if SigHashType::from_byte(*hash_type) != Some(SigHashType::All) {
        return Err(invalid("unsupported hash type"));
    }
    let signature = Signature::from_der(der).map_err(|_| invalid("bad DER encoding"))?;
    // the scriptSig carries these bytes verbatim, so S must already be low
    let mut low_s = signature;
    low_s.normalize_s();
    if low_s != signature {
        return Err(invalid("high-S signature is not standard"));
    }

    let digest = unsigned
        .signature_hash(partial.input_index, &spec.redeem_script, SigHashType::All)
        .map_err(|_| invalid("input out of range"))?;
    if !verify_digest(&pubkey, &digest, &signature) {
        return Err(invalid("signature does not verify"));
    }
    Ok(position)
}

/// Build `OP_0 <sig_1> ... <sig_M> <redeemScript>`
///
/// Signatures are reordered to follow their keys' positions in the redeem
/// script. Signatures from keys outside the script and repeats of the same
/// key are dropped before counting.
pub fn assemble_script_sig(
    redeem_script: &Script,
    signatures: &[PartialSignature],
) -> Result<Script, MultisigError> {
    let (required, pubkeys) = parse_multisig_script(redeem_script)?;

    let mut by_position: Vec<Option<&[u8]>> = vec![None; pubkeys.len()];
    for partial in signatures {
        if let Some(position) = pubkeys.iter().position(|pk| *pk == partial.pubkey) {
            by_position[position].get_or_insert(&partial.signature);
        }
    }

    let ordered: Vec<&[u8]> = by_position.into_iter().flatten().take(required).collect();
    if ordered.len() < required {
        return Err(MultisigError::SignatureCountMismatch {
            have: ordered.len(),
            need: required,
        });
    }

    // OP_0 feeds the extra element CHECKMULTISIG pops
    let mut builder = Script::builder().push_int(0);
    for signature in ordered {
        builder = builder.push_data(signature);
    }
    Ok(builder.push_data(redeem_script.as_bytes()).build())
}

/// Verify then assemble the scriptSig for one input
///
/// Signatures that fail verification are discarded, so they count against
/// the threshold instead of poisoning the result.
pub fn assemble_input(
    unsigned: &Transaction,
    input_index: usize,
    spec: &MultisigSpec,
    signatures: &[PartialSignature],
) -> Result<Script, MultisigError> {
    let valid: Vec<PartialSignature> = signatures
        .iter()
        .filter(|partial| partial.input_index == input_index)
        .filter(|partial| match verify_partial(unsigned, spec, partial) {
            Ok(_) => true,
            Err(e) => {
                log::warn!("Discarding signature: {}", e);
                false
            }
        })
        .cloned()
        .collect();
    assemble_script_sig(&spec.redeem_script, &valid)
}
