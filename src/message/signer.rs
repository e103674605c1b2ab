//! Compact recoverable message signatures
//!
//! The digest is `double_sha256(varint(len(prefix)) || prefix ||
//! varint(len(msg)) || msg)`. Signatures are 65 bytes: a header byte
//! `27 + recovery_id (+4 if the key is compressed)` followed by `r || s`,
//! transported as Base64.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine as _;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};
use serde::{Deserialize, Serialize};

use super::MessageError;
use crate::codec::write_var_bytes;
use crate::crypto::hash::{double_sha256, sha256_hex};
use crate::crypto::keys::{p2pkh_address, serialize_public_key, verify_digest, KeyPair};
use crate::params::NetworkParams;

/// Length of a compact recoverable signature
pub const COMPACT_SIGNATURE_LEN: usize = 65;

const HEADER_BASE: u8 = 27;
const COMPRESSED_FLAG: u8 = 4;

/// Digest used for a signed message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    /// Double SHA-256 over the prefixed message
    DoubleSha256,
}

/// A signed message as handed to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message: String,
    /// Signing key's P2PKH address
    pub address: String,
    /// Base64 of the 65-byte compact signature
    pub signature: String,
    pub digest: DigestAlgorithm,
}

/// Digest of `message` under the network's message prefix
pub fn hash_message(prefix: &str, message: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(prefix.len() + message.len() + 10);
    write_var_bytes(&mut buf, prefix.as_bytes());
    write_var_bytes(&mut buf, message);
    double_sha256(&buf)
}

/// Sign `message` with `key`
///
/// Fails with `RecoveryIdNotFound` if none of the four candidate recovery
/// ids reproduces the signing key.
pub fn sign_message(
    params: &NetworkParams,
    key: &KeyPair,
    message: &str,
) -> Result<SignedMessage, MessageError> {
    let digest = hash_message(&params.message_prefix, message.as_bytes());
    let signature = key.sign_digest(&digest)?;
    let compact = signature.serialize_compact();

    let secp = Secp256k1::verification_only();
    let msg = Message::from_digest_slice(&digest).map_err(crate::crypto::KeyError::from)?;
    let recovery_id = (0..4)
        .find(|i| {
            let Ok(id) = RecoveryId::from_i32(*i) else {
                return false;
            };
            RecoverableSignature::from_compact(&compact, id)
                .and_then(|sig| secp.recover_ecdsa(&msg, &sig))
                .map(|recovered| recovered == key.public_key)
                .unwrap_or(false)
        })
        .ok_or(MessageError::RecoveryIdNotFound)?;

    let mut header = HEADER_BASE + recovery_id as u8;
    if key.compressed {
        header += COMPRESSED_FLAG;
    }
    let mut encoded = [0u8; COMPACT_SIGNATURE_LEN];
    encoded[0] = header;
    encoded[1..].copy_from_slice(&compact);

    log::debug!("Signed {} byte message with recovery id {}", message.len(), recovery_id);
    Ok(SignedMessage {
        message: message.to_string(),
        address: key.address(params),
        signature: STANDARD.encode(encoded),
        digest: DigestAlgorithm::DoubleSha256,
    })
}

/// Whether `signature` over `message` was produced by the key behind `address`
///
/// Accepts padded or unpadded Base64, or 130 hex characters. The recovered
/// key is compared in both encodings, so signatures whose header mislabels
/// compression still verify against the matching address.
pub fn verify_message(
    params: &NetworkParams,
    address: &str,
    message: &str,
    signature: &str,
) -> Result<bool, MessageError> {
    let bytes = decode_signature(signature)?;
    let header = bytes[0];
    if !(HEADER_BASE..HEADER_BASE + 8).contains(&header) {
        return Err(MessageError::MalformedSignature(format!(
            "header byte {} out of range",
            header
        )));
    }
    let recovery_id = RecoveryId::from_i32(((header - HEADER_BASE) & 3) as i32)
        .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;
    let recoverable = RecoverableSignature::from_compact(&bytes[1..], recovery_id)
        .map_err(|e| MessageError::MalformedSignature(e.to_string()))?;

    let digest = hash_message(&params.message_prefix, message.as_bytes());
    let msg = Message::from_digest_slice(&digest).map_err(crate::crypto::KeyError::from)?;
    let secp = Secp256k1::verification_only();
    let Ok(recovered) = secp.recover_ecdsa(&msg, &recoverable) else {
        return Ok(false);
    };
    if !verify_digest(&recovered, &digest, &recoverable.to_standard()) {
        return Ok(false);
    }

    let matches = [true, false].iter().any(|compressed| {
        p2pkh_address(params, &serialize_public_key(&recovered, *compressed)) == address.trim()
    });
    Ok(matches)
}

/// Decode the transport form of a signature into its 65 bytes
pub fn decode_signature(text: &str) -> Result<[u8; COMPACT_SIGNATURE_LEN], MessageError> {
    let text = text.trim();
    let raw = if text.len() == COMPACT_SIGNATURE_LEN * 2 && text.bytes().all(|b| b.is_ascii_hexdigit()) {
        hex::decode(text).map_err(|e| MessageError::MalformedSignature(e.to_string()))?
    } else {
        STANDARD_NO_PAD
            .decode(text.trim_end_matches('='))
            .map_err(|e| MessageError::MalformedSignature(format!("bad Base64: {}", e)))?
    };

    raw.as_slice().try_into().map_err(|_| {
        MessageError::MalformedSignature(format!(
            "expected {} bytes, got {}",
            COMPACT_SIGNATURE_LEN,
            raw.len()
        ))
    })
}

/// SHA-256 hex fingerprint of arbitrary content
pub fn content_fingerprint(content: &[u8]) -> String {
    sha256_hex(content)
}

/// Sign the fingerprint of `content` rather than the content itself
pub fn sign_content(
    params: &NetworkParams,
    key: &KeyPair,
    content: &[u8],
) -> Result<SignedMessage, MessageError> {
    sign_message(params, key, &content_fingerprint(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NetworkParams {
        NetworkParams::mainnet()
    }

    #[test]
    fn test_hash_message_layout() {
        let prefix = "Dogecoin Signed Message:\n";
        let mut expected = vec![prefix.len() as u8];
        expected.extend_from_slice(prefix.as_bytes());
        expected.push(5);
        expected.extend_from_slice(b"hello");
        assert_eq!(hash_message(prefix, b"hello"), double_sha256(&expected));
    }

    #[test]
    fn test_long_message_uses_multibyte_length() {
        let long = vec![b'x'; 300];
        let mut expected = vec![3u8];
        expected.extend_from_slice(b"abc");
        expected.extend_from_slice(&[0xfd, 0x2c, 0x01]);
        expected.extend_from_slice(&long);
        assert_eq!(hash_message("abc", &long), double_sha256(&expected));
    }

    #[test]
    fn test_sign_and_verify() {
        let key = KeyPair::generate();
        let signed = sign_message(&params(), &key, "hello").unwrap();
        assert_eq!(signed.address, key.address(&params()));
        assert!(verify_message(&params(), &signed.address, "hello", &signed.signature).unwrap());
        assert!(!verify_message(&params(), &signed.address, "hello!", &signed.signature).unwrap());

        let other = KeyPair::generate().address(&params());
        assert!(!verify_message(&params(), &other, "hello", &signed.signature).unwrap());
    }

    #[test]
    fn test_header_encodes_compression() {
        let key = KeyPair::generate();
        let signed = sign_message(&params(), &key, "compressed").unwrap();
        let header = decode_signature(&signed.signature).unwrap()[0];
        assert!((31..=34).contains(&header));

        let uncompressed = KeyPair::from_secret_key(key.secret_key, false);
        let signed = sign_message(&params(), &uncompressed, "uncompressed").unwrap();
        let header = decode_signature(&signed.signature).unwrap()[0];
        assert!((27..=30).contains(&header));
        assert!(verify_message(&params(), &signed.address, "uncompressed", &signed.signature).unwrap());
    }

    #[test]
    fn test_unpadded_and_hex_forms_verify() {
        let key = KeyPair::generate();
        let signed = sign_message(&params(), &key, "forms").unwrap();
        let bytes = decode_signature(&signed.signature).unwrap();

        let unpadded = signed.signature.trim_end_matches('=');
        assert!(verify_message(&params(), &signed.address, "forms", unpadded).unwrap());
        assert!(verify_message(&params(), &signed.address, "forms", &hex::encode(bytes)).unwrap());
    }

    #[test]
    fn test_malformed_signatures() {
        let address = KeyPair::generate().address(&params());
        assert!(matches!(
            verify_message(&params(), &address, "m", "not base64!"),
            Err(MessageError::MalformedSignature(_))
        ));
        assert!(matches!(
            verify_message(&params(), &address, "m", &STANDARD.encode([31u8; 10])),
            Err(MessageError::MalformedSignature(_))
        ));
        let mut bad_header = [1u8; COMPACT_SIGNATURE_LEN];
        bad_header[0] = 50;
        assert!(matches!(
            verify_message(&params(), &address, "m", &STANDARD.encode(bad_header)),
            Err(MessageError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_sign_content_fingerprint() {
        let key = KeyPair::generate();
        let content = b"file contents";
        let signed = sign_content(&params(), &key, content).unwrap();
        assert_eq!(signed.message, content_fingerprint(content));
        assert_eq!(signed.message.len(), 64);
        assert!(verify_message(&params(), &signed.address, &signed.message, &signed.signature).unwrap());
    }

    #[test]
    fn test_signature_is_base64_of_65_bytes() {
        let key = KeyPair::generate();
        let signed = sign_message(&params(), &key, "len").unwrap();
        assert_eq!(signed.signature.len(), 88);
        assert_eq!(signed.digest, DigestAlgorithm::DoubleSha256);
    }
}
