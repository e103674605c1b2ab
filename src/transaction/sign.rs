//! Input signatures and standard scriptSigs

use super::tx::{SigHashType, Transaction};
use super::TransactionError;
use crate::crypto::keys::KeyPair;
use crate::script::Script;

/// DER signature plus hash-type byte for input `index`
pub fn input_signature(
    tx: &Transaction,
    index: usize,
    subscript: &Script,
    key: &KeyPair,
) -> Result<Vec<u8>, TransactionError> {
    let digest = tx.signature_hash(index, subscript, SigHashType::All)?;
    let mut signature = key.sign_digest(&digest)?.serialize_der().to_vec();
    signature.push(SigHashType::All as u8);
    Ok(signature)
}

/// `<sig> <pubkey>`
pub fn p2pkh_script_sig(signature: &[u8], pubkey: &[u8]) -> Script {
    Script::builder().push_data(signature).push_data(pubkey).build()
}

/// `<sig> <redeem_script>` for a redeem script ending in OP_CHECKSIG
pub fn single_key_p2sh_script_sig(signature: &[u8], redeem_script: &Script) -> Script {
    Script::builder()
        .push_data(signature)
        .push_data(redeem_script.as_bytes())
        .build()
}
