//! Wallet Import Format
//!
//! `Base58Check(wif_version || secret32 [|| 0x01])`, where the trailing
//! `0x01` marks a key whose public key is published compressed.

use zeroize::Zeroizing;

use super::base58::{decode_check, encode_check, Base58Error};
use super::keys::{KeyError, KeyPair};
use crate::params::NetworkParams;

const COMPRESSION_FLAG: u8 = 0x01;

/// Encode a key pair as WIF for the given network
///
/// The encoding is decoded again before returning so a corrupted result
/// never reaches a paper check or QR code.
pub fn export_wif(key: &KeyPair, params: &NetworkParams) -> Result<Zeroizing<String>, KeyError> {
    let mut payload = Zeroizing::new(Vec::with_capacity(33));
    payload.extend_from_slice(&*key.secret_bytes());
    if key.compressed {
        payload.push(COMPRESSION_FLAG);
    }

    let wif = Zeroizing::new(encode_check(params.wif_version, &payload));
    let decoded = import_wif(&wif, params)
        .map_err(|e| KeyError::EncodingError(format!("WIF self-check failed: {}", e)))?;
    if decoded != *key {
        return Err(KeyError::EncodingError(
            "WIF self-check decoded a different key".to_string(),
        ));
    }
    Ok(wif)
}

/// Decode a WIF string into a key pair
pub fn import_wif(wif: &str, params: &NetworkParams) -> Result<KeyPair, KeyError> {
    let decoded = decode_check(wif).map_err(|e| match e {
        Base58Error::ChecksumMismatch => KeyError::InvalidWif("checksum mismatch".to_string()),
        other => KeyError::InvalidWif(other.to_string()),
    })?;

    let (version, body) = decoded.split_at(1);
    if version[0] != params.wif_version {
        return Err(KeyError::InvalidWif(format!(
            "version byte 0x{:02x} does not match network ({})",
            version[0], params.network
        )));
    }

    let key = match body.len() {
        32 => KeyPair::from_secret_bytes(body, false),
        33 if body[32] == COMPRESSION_FLAG => KeyPair::from_secret_bytes(&body[..32], true),
        33 => Err(KeyError::InvalidWif(format!(
            "unexpected compression flag 0x{:02x}",
            body[32]
        ))),
        n => Err(KeyError::InvalidWif(format!("unexpected payload length {}", n))),
    };
    key.map_err(|e| match e {
        KeyError::InvalidPrivateKey => KeyError::InvalidWif("scalar out of range".to_string()),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET_HEX: &str = "0c28fca386c7a227600b2fe50b7cae11ec86d3bf1fbe471be89827e19d72aa1d";

    fn bitcoin_like_params() -> NetworkParams {
        NetworkParams {
            wif_version: 0x80,
            ..NetworkParams::mainnet()
        }
    }

    #[test]
    fn test_known_uncompressed_vector() {
        let params = bitcoin_like_params();
        let key = KeyPair::from_secret_bytes(&hex::decode(SECRET_HEX).unwrap(), false).unwrap();
        let wif = export_wif(&key, &params).unwrap();
        assert_eq!(
            wif.as_str(),
            "5HueCGU8rMjxEXxiPuD5BDku4MkFqeZyd4dZ1jvhTVqvbTLvyTJ"
        );
    }

    #[test]
    fn test_known_compressed_vector() {
        let params = bitcoin_like_params();
        let key = import_wif("KwdMAjGmerYanjeui5SHS7JkmpZvVipYvB2LJGU1ZxJwYvP98617", &params)
            .unwrap();
        assert!(key.compressed);
        assert_eq!(hex::encode(*key.secret_bytes()), SECRET_HEX);
    }

    #[test]
    fn test_export_compressed_vector() {
        let params = bitcoin_like_params();
        let key = KeyPair::from_private_key_hex(SECRET_HEX).unwrap();
        let wif = export_wif(&key, &params).unwrap();
        assert_eq!(
            wif.as_str(),
            "KwdMAjGmerYanjeui5SHS7JkmpZvVipYvB2LJGU1ZxJwYvP98617"
        );
    }

    #[test]
    fn test_roundtrip_preserves_compression() {
        let params = NetworkParams::mainnet();
        for compressed in [true, false] {
            let key = KeyPair::from_secret_key(KeyPair::generate().secret_key, compressed);
            let wif = export_wif(&key, &params).unwrap();
            let restored = import_wif(&wif, &params).unwrap();
            assert_eq!(restored, key);
            assert_eq!(restored.compressed, compressed);
        }
    }

    #[test]
    fn test_rejects_wrong_network() {
        let key = KeyPair::generate();
        let wif = export_wif(&key, &NetworkParams::testnet()).unwrap();
        assert!(matches!(
            import_wif(&wif, &NetworkParams::mainnet()),
            Err(KeyError::InvalidWif(_))
        ));
    }

    #[test]
    fn test_rejects_corrupted_checksum() {
        let params = NetworkParams::mainnet();
        let wif = export_wif(&KeyPair::generate(), &params).unwrap();
        let mut corrupted = wif.to_string();
        let last = corrupted.pop().unwrap();
        corrupted.push(if last == 'a' { 'b' } else { 'a' });
        assert!(matches!(
            import_wif(&corrupted, &params),
            Err(KeyError::InvalidWif(_))
        ));
        assert!(matches!(
            import_wif("not-a-wif", &params),
            Err(KeyError::InvalidWif(_))
        ));
    }
}
