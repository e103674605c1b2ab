//! Base58Check encoding
//!
//! Payloads are `version || data`, followed by the first four bytes of
//! their double SHA-256.

use thiserror::Error;
use zeroize::Zeroizing;

use super::hash::double_sha256;

const CHECKSUM_LEN: usize = 4;

/// Errors from Base58Check decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("Invalid Base58 character: {0}")]
    InvalidCharacter(String),
    #[error("Payload too short: {0} bytes")]
    TooShort(usize),
    #[error("Checksum mismatch")]
    ChecksumMismatch,
}

/// Encode `version || payload` with a trailing checksum
pub fn encode_check(version: u8, payload: &[u8]) -> String {
    let mut buf = Zeroizing::new(Vec::with_capacity(1 + payload.len() + CHECKSUM_LEN));
    buf.push(version);
    buf.extend_from_slice(payload);
    let checksum = double_sha256(&buf);
    buf.extend_from_slice(&checksum[..CHECKSUM_LEN]);
    bs58::encode(&buf[..]).into_string()
}

/// Decode and verify a Base58Check string
///
/// Returns `version || payload` with the checksum stripped. The buffer is
/// wiped on drop since it may hold private key bytes.
pub fn decode_check(encoded: &str) -> Result<Zeroizing<Vec<u8>>, Base58Error> {
    let raw = Zeroizing::new(
        bs58::decode(encoded.trim())
            .into_vec()
            .map_err(|e| Base58Error::InvalidCharacter(e.to_string()))?,
    );
    if raw.len() < 1 + CHECKSUM_LEN {
        return Err(Base58Error::TooShort(raw.len()));
    }

    let (body, checksum) = raw.split_at(raw.len() - CHECKSUM_LEN);
    if double_sha256(body)[..CHECKSUM_LEN] != *checksum {
        return Err(Base58Error::ChecksumMismatch);
    }
    Ok(Zeroizing::new(body.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_hash_address() {
        assert_eq!(encode_check(0x00, &[0u8; 20]), "1111111111111111111114oLvT2");
    }

    #[test]
    fn test_decode_roundtrip_keeps_version() {
        let encoded = encode_check(0x1e, &[7u8; 20]);
        let decoded = decode_check(&encoded).unwrap();
        assert_eq!(decoded[0], 0x1e);
        assert_eq!(&decoded[1..], &[7u8; 20]);
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut encoded = encode_check(0x1e, &[7u8; 20]);
        let last = encoded.pop().unwrap();
        encoded.push(if last == '2' { '3' } else { '2' });
        assert!(matches!(
            decode_check(&encoded),
            Err(Base58Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(matches!(
            decode_check("0OIl"),
            Err(Base58Error::InvalidCharacter(_))
        ));
        assert!(matches!(decode_check("11"), Err(Base58Error::TooShort(2))));
    }
}
