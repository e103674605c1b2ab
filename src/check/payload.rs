//! QR payload for check redemption
//!
//! `WIF|P2SH_ADDRESS|LOCKTIME` for time-locked checks. Older checks carry
//! `WIF|P2SH_ADDRESS` or a bare `WIF`.

use std::fmt;
use zeroize::Zeroizing;

use super::CheckError;
use crate::crypto::keys::KeyPair;
use crate::crypto::wif::import_wif;
use crate::params::NetworkParams;
use crate::script::{Address, AddressKind};

const SEPARATOR: char = '|';

/// Decoded check payload
#[derive(Clone, PartialEq, Eq)]
pub struct CheckPayload {
    wif: Zeroizing<String>,
    pub address: Option<Address>,
    pub locktime: Option<u32>,
}

impl CheckPayload {
    pub fn new(wif: Zeroizing<String>, address: Option<Address>, locktime: Option<u32>) -> Self {
        Self {
            wif,
            address,
            locktime,
        }
    }

    /// Parse any of the three payload forms
    ///
    /// The address must be a P2SH address on `params`' network and the
    /// locktime a decimal integer; the key itself is checked by [`Self::key`].
    pub fn parse(params: &NetworkParams, text: &str) -> Result<Self, CheckError> {
        let fields: Vec<&str> = text.trim().split(SEPARATOR).map(str::trim).collect();
        let (wif, address, locktime) = match fields.as_slice() {
            [wif] => (*wif, None, None),
            [wif, address] => (*wif, Some(*address), None),
            [wif, address, locktime] => (*wif, Some(*address), Some(*locktime)),
            _ => {
                return Err(CheckError::InvalidPayload(format!(
                    "expected at most 3 fields, found {}",
                    fields.len()
                )))
            }
        };

        if wif.is_empty() {
            return Err(CheckError::InvalidPayload("missing key".to_string()));
        }

        let address = address
            .map(|a| {
                let address = Address::from_base58(params, a)
                    .map_err(|e| CheckError::InvalidPayload(e.to_string()))?;
                if address.kind() != AddressKind::P2sh {
                    return Err(CheckError::InvalidPayload(format!("{} is not a P2SH address", a)));
                }
                Ok(address)
            })
            .transpose()?;

        let locktime = locktime
            .map(|l| {
                l.parse::<u32>()
                    .map_err(|_| CheckError::InvalidPayload(format!("invalid locktime {}", l)))
            })
            .transpose()?;

        Ok(Self {
            wif: Zeroizing::new(wif.to_string()),
            address,
            locktime,
        })
    }

    /// Encode back to payload text
    pub fn encode(&self) -> Zeroizing<String> {
        let mut out = Zeroizing::new(self.wif.to_string());
        if let Some(address) = &self.address {
            out.push(SEPARATOR);
            out.push_str(&address.to_string());
            if let Some(locktime) = self.locktime {
                out.push(SEPARATOR);
                out.push_str(&locktime.to_string());
            }
        }
        out
    }

    pub fn field_count(&self) -> usize {
        match (&self.address, self.locktime) {
            (None, _) => 1,
            (Some(_), None) => 2,
            (Some(_), Some(_)) => 3,
        }
    }

    /// Whether the payload describes a time-locked P2SH output
    pub fn is_time_locked(&self) -> bool {
        self.field_count() == 3
    }

    pub fn wif(&self) -> &str {
        &self.wif
    }

    /// Decode the embedded key
    pub fn key(&self, params: &NetworkParams) -> Result<KeyPair, CheckError> {
        Ok(import_wif(&self.wif, params)?)
    }
}

impl fmt::Debug for CheckPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckPayload")
            .field("address", &self.address.as_ref().map(ToString::to_string))
            .field("locktime", &self.locktime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::wif::export_wif;
    use crate::script::LockedOutputSpec;

    fn fixture() -> (NetworkParams, KeyPair, LockedOutputSpec) {
        let params = NetworkParams::mainnet();
        let key = KeyPair::generate();
        let spec = LockedOutputSpec::new(&params, 1_800_000_000, &key.public_key_bytes()).unwrap();
        (params, key, spec)
    }

    #[test]
    fn test_three_field_payload() {
        let (params, key, spec) = fixture();
        let wif = export_wif(&key, &params).unwrap();
        let text = format!("{}|{}|{}", wif.as_str(), spec.address, spec.locktime);

        let payload = CheckPayload::parse(&params, &text).unwrap();
        assert_eq!(payload.field_count(), 3);
        assert!(payload.is_time_locked());
        assert_eq!(payload.locktime, Some(1_800_000_000));
        assert_eq!(payload.address.as_ref().unwrap().to_string(), spec.address);
        assert_eq!(payload.key(&params).unwrap(), key);
        assert_eq!(payload.encode().as_str(), text);
        assert_eq!(payload.encode().split('|').count(), 3);
    }

    #[test]
    fn test_legacy_forms() {
        let (params, key, spec) = fixture();
        let wif = export_wif(&key, &params).unwrap();

        let bare = CheckPayload::parse(&params, &wif).unwrap();
        assert_eq!(bare.field_count(), 1);
        assert_eq!(bare.encode().split('|').count(), 1);
        assert!(bare.address.is_none());

        let two = CheckPayload::parse(&params, &format!(" {} | {} ", wif.as_str(), spec.address)).unwrap();
        assert_eq!(two.field_count(), 2);
        assert!(two.locktime.is_none());
    }

    #[test]
    fn test_rejects_bad_fields() {
        let (params, key, spec) = fixture();
        let wif = export_wif(&key, &params).unwrap();
        let p2pkh = key.address(&params);

        for text in [
            format!("{}|{}", wif.as_str(), p2pkh),
            format!("{}|{}|soon", wif.as_str(), spec.address),
            format!("{}|{}|1|2", wif.as_str(), spec.address),
            format!("|{}", spec.address),
        ] {
            assert!(
                matches!(CheckPayload::parse(&params, &text), Err(CheckError::InvalidPayload(_))),
                "accepted {}",
                text
            );
        }

        let testnet = NetworkParams::testnet();
        assert!(CheckPayload::parse(&testnet, &format!("{}|{}", wif.as_str(), spec.address)).is_err());
    }

    #[test]
    fn test_debug_hides_wif() {
        let (params, key, _) = fixture();
        let wif = export_wif(&key, &params).unwrap();
        let payload = CheckPayload::parse(&params, &wif).unwrap();
        assert!(!format!("{:?}", payload).contains(wif.as_str()));
    }
}
