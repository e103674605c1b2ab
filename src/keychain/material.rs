//! Wallet key material
//!
//! Keys come from the account's external chain `m/44'/coin'/0'/0/i`.
//! Callers ask for a key by purpose; each purpose maps to an ordered list
//! of sources that are tried until one yields a key.

use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::{Mutex, MutexGuard};
use zeroize::Zeroizing;

use super::bip32::{ChildNumber, ExtendedPrivKey, HARDENED_OFFSET};
use crate::crypto::hash::hash160;
use crate::crypto::keys::{KeyError, KeyPair};
use crate::params::NetworkParams;

/// How far past the last issued index `find_issued` looks
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Length of seeds produced by `KeyMaterial::generate`
pub const SEED_LEN: usize = 32;

/// What a key is going to be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    /// Key locked inside a time-locked check output
    CheckLock,
    /// Identity key for signed messages
    MessageSigning,
    /// This wallet's share of a multisig arrangement
    Cosigner,
}

impl KeyPurpose {
    /// Ordered sources tried for this purpose
    pub fn sources(self) -> Vec<KeySource> {
        match self {
            KeyPurpose::MessageSigning => vec![KeySource::Derived(0), KeySource::FreshReceive],
            KeyPurpose::CheckLock | KeyPurpose::Cosigner => {
                vec![KeySource::FreshReceive]
            }
        }
    }
}

/// A place a key can come from
#[derive(Debug, Clone)]
pub enum KeySource {
    /// A key the caller already holds
    Known(KeyPair),
    /// A specific index on the external chain
    Derived(u32),
    /// The next unissued index on the external chain
    FreshReceive,
}

struct KeychainState {
    /// `None` while locked
    account: Option<ExtendedPrivKey>,
    /// HASH160 of the chain node's public key; kept while locked to check unlock seeds
    fingerprint: [u8; 20],
    next_index: u32,
}

/// Deterministic key source for one account
pub struct KeyMaterial {
    params: NetworkParams,
    gap_limit: u32,
    index_limit: u32,
    state: Mutex<KeychainState>,
}

impl KeyMaterial {
    /// Build key material from a BIP32 seed
    pub fn from_seed(seed: &[u8], params: NetworkParams) -> Result<Self, KeyError> {
        let chain = derive_external_chain(seed, &params)?;
        let fingerprint = hash160(&chain.to_key_pair().public_key_bytes());
        Ok(Self {
            params,
            gap_limit: DEFAULT_GAP_LIMIT,
            index_limit: HARDENED_OFFSET,
            state: Mutex::new(KeychainState {
                account: Some(chain),
                fingerprint,
                next_index: 0,
            }),
        })
    }

    /// Build key material from a fresh random seed
    ///
    /// The seed is returned so the caller can back it up.
    pub fn generate(params: NetworkParams) -> Result<(Self, Zeroizing<Vec<u8>>), KeyError> {
        let mut seed = Zeroizing::new(vec![0u8; SEED_LEN]);
        OsRng.fill_bytes(&mut seed);
        let material = Self::from_seed(&seed, params)?;
        Ok((material, seed))
    }

    pub fn with_gap_limit(mut self, gap_limit: u32) -> Self {
        self.gap_limit = gap_limit;
        self
    }

    /// Cap the number of keys `fresh_key` may issue
    pub fn with_index_limit(mut self, index_limit: u32) -> Self {
        self.index_limit = index_limit.min(HARDENED_OFFSET);
        self
    }

    /// Resume issuing from `next_index`, e.g. after reloading a wallet
    pub fn with_next_index(self, next_index: u32) -> Self {
        self.state().next_index = next_index;
        self
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn is_locked(&self) -> bool {
        self.state().account.is_none()
    }

    /// Drop the private chain node from memory
    pub fn lock(&self) {
        let mut state = self.state();
        if state.account.take().is_some() {
            log::info!("Keychain locked");
        }
    }

    /// Restore the private chain node from the wallet seed
    pub fn unlock(&self, seed: &[u8]) -> Result<(), KeyError> {
        let chain = derive_external_chain(seed, &self.params)?;
        let mut state = self.state();
        if hash160(&chain.to_key_pair().public_key_bytes()) != state.fingerprint {
            return Err(KeyError::KeyUnavailable(
                "seed does not belong to this keychain".to_string(),
            ));
        }
        state.account = Some(chain);
        log::info!("Keychain unlocked");
        Ok(())
    }

    /// Number of external-chain keys issued so far
    pub fn issued_count(&self) -> u32 {
        self.state().next_index
    }

    /// Key at a specific external-chain index, without issuing it
    pub fn key_at(&self, index: u32) -> Result<KeyPair, KeyError> {
        let state = self.state();
        derive_at(&state, index)
    }

    /// Issue the next unused key
    ///
    /// Index allocation and derivation happen under one lock so concurrent
    /// callers never receive the same key.
    pub fn fresh_key(&self) -> Result<(u32, KeyPair), KeyError> {
        let mut state = self.state();
        let index = state.next_index;
        if index >= self.index_limit {
            return Err(KeyError::KeyUnavailable(format!(
                "external chain exhausted after {} keys",
                self.index_limit
            )));
        }
        let key = derive_at(&state, index)?;
        state.next_index = index + 1;
        log::debug!("Issued key at index {}", index);
        Ok((index, key))
    }

    /// Produce a key for `purpose`, trying its sources in order
    pub fn derive_or_fetch_key(&self, purpose: KeyPurpose) -> Result<KeyPair, KeyError> {
        self.fetch_from(purpose.sources())
    }

    /// Try each source in order, returning the first key produced
    pub fn fetch_from(&self, sources: Vec<KeySource>) -> Result<KeyPair, KeyError> {
        let mut last_error = None;
        for source in sources {
            let attempt = match source {
                KeySource::Known(key) => Ok(key),
                KeySource::Derived(index) => self.key_at(index),
                KeySource::FreshReceive => self.fresh_key().map(|(_, key)| key),
            };
            match attempt {
                Ok(key) => return Ok(key),
                Err(e) => {
                    log::debug!("Key source failed: {}", e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| KeyError::KeyUnavailable("no key source configured".to_string())))
    }

    /// Index of an issued key (or one within the gap limit) with this HASH160
    pub fn find_issued(&self, pubkey_hash: &[u8; 20]) -> Option<u32> {
        let state = self.state();
        let end = state.next_index.saturating_add(self.gap_limit);
        (0..end).find(|index| {
            derive_at(&state, *index)
                .map(|key| key.pubkey_hash() == *pubkey_hash)
                .unwrap_or(false)
        })
    }

    fn state(&self) -> MutexGuard<'_, KeychainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn derive_external_chain(seed: &[u8], params: &NetworkParams) -> Result<ExtendedPrivKey, KeyError> {
    ExtendedPrivKey::from_seed(seed)?.derive_path(&[
        ChildNumber::Hardened(44),
        ChildNumber::Hardened(params.bip44_coin_type),
        ChildNumber::Hardened(0),
        ChildNumber::Normal(0),
    ])
}

fn derive_at(state: &KeychainState, index: u32) -> Result<KeyPair, KeyError> {
    let chain = state
        .account
        .as_ref()
        .ok_or_else(|| KeyError::KeyUnavailable("keychain is locked".to_string()))?;
    Ok(chain.derive_child(ChildNumber::Normal(index))?.to_key_pair())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn material() -> KeyMaterial {
        KeyMaterial::from_seed(&[42u8; 32], NetworkParams::mainnet()).unwrap()
    }

    #[test]
    fn test_fresh_keys_are_distinct_and_sequential() {
        let keys = material();
        let (i0, k0) = keys.fresh_key().unwrap();
        let (i1, k1) = keys.fresh_key().unwrap();
        assert_eq!((i0, i1), (0, 1));
        assert_ne!(k0, k1);
        assert_eq!(keys.issued_count(), 2);
        assert_eq!(keys.key_at(1).unwrap(), k1);
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let a = material();
        let b = material();
        assert_eq!(a.key_at(5).unwrap(), b.key_at(5).unwrap());

        let testnet = KeyMaterial::from_seed(&[42u8; 32], NetworkParams::testnet()).unwrap();
        assert_ne!(a.key_at(0).unwrap(), testnet.key_at(0).unwrap());
    }

    #[test]
    fn test_concurrent_fresh_keys_never_collide() {
        let keys = Arc::new(material());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let keys = Arc::clone(&keys);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|_| keys.fresh_key().unwrap().0)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for index in handle.join().unwrap() {
                assert!(seen.insert(index), "index {} issued twice", index);
            }
        }
        assert_eq!(seen.len(), 80);
        assert_eq!(keys.issued_count(), 80);
    }

    #[test]
    fn test_locked_keychain_refuses_keys() {
        let keys = material();
        keys.lock();
        assert!(keys.is_locked());
        assert!(matches!(
            keys.derive_or_fetch_key(KeyPurpose::CheckLock),
            Err(KeyError::KeyUnavailable(_))
        ));

        assert!(keys.unlock(&[7u8; 32]).is_err());
        keys.unlock(&[42u8; 32]).unwrap();
        assert!(!keys.is_locked());
        assert!(keys.derive_or_fetch_key(KeyPurpose::CheckLock).is_ok());
    }

    #[test]
    fn test_sources_tried_in_order() {
        let keys = material();
        let known = KeyPair::generate();
        let key = keys
            .fetch_from(vec![KeySource::Known(known.clone()), KeySource::FreshReceive])
            .unwrap();
        assert_eq!(key, known);
        assert_eq!(keys.issued_count(), 0);

        let signing = keys.derive_or_fetch_key(KeyPurpose::MessageSigning).unwrap();
        assert_eq!(signing, keys.key_at(0).unwrap());

        assert!(keys.fetch_from(Vec::new()).is_err());
    }

    #[test]
    fn test_find_issued_within_gap() {
        let keys = material().with_gap_limit(5);
        let (_, k) = keys.fresh_key().unwrap();
        assert_eq!(keys.find_issued(&k.pubkey_hash()), Some(0));

        let ahead = keys.key_at(4).unwrap();
        assert_eq!(keys.find_issued(&ahead.pubkey_hash()), Some(4));

        let beyond = keys.key_at(30).unwrap();
        assert_eq!(keys.find_issued(&beyond.pubkey_hash()), None);
    }

    #[test]
    fn test_index_limit_exhausts_chain() {
        let keys = material().with_index_limit(2);
        keys.fresh_key().unwrap();
        keys.fresh_key().unwrap();
        assert!(matches!(
            keys.fresh_key(),
            Err(KeyError::KeyUnavailable(_))
        ));
        assert_eq!(keys.issued_count(), 2);
    }

    #[test]
    fn test_generate_returns_matching_seed() {
        let (keys, seed) = KeyMaterial::generate(NetworkParams::testnet()).unwrap();
        let restored = KeyMaterial::from_seed(&seed, NetworkParams::testnet()).unwrap();
        assert_eq!(keys.key_at(0).unwrap(), restored.key_at(0).unwrap());
    }
}
