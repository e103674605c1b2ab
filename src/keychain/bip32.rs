//! Hierarchical deterministic private key derivation
//!
//! Only the private derivation path is needed: the wallet derives child
//! keys it owns, it never derives from an extended public key.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::crypto::keys::{KeyError, KeyPair};

type HmacSha512 = Hmac<Sha512>;

/// Offset of hardened child indices
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

const MASTER_KEY_DOMAIN: &[u8] = b"Bitcoin seed";

/// One step in a derivation path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildNumber {
    Normal(u32),
    Hardened(u32),
}

impl ChildNumber {
    fn to_index(self) -> Result<u32, KeyError> {
        match self {
            ChildNumber::Normal(i) if i < HARDENED_OFFSET => Ok(i),
            ChildNumber::Hardened(i) if i < HARDENED_OFFSET => Ok(i | HARDENED_OFFSET),
            _ => Err(KeyError::KeyUnavailable(format!(
                "child index {:?} out of range",
                self
            ))),
        }
    }
}

/// An extended private key: secret scalar plus chain code
pub struct ExtendedPrivKey {
    secret_key: SecretKey,
    chain_code: Zeroizing<[u8; 32]>,
    pub depth: u8,
}

impl ExtendedPrivKey {
    /// Derive the master node from a seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(KeyError::KeyUnavailable(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            )));
        }
        let (il, ir) = hmac_split(MASTER_KEY_DOMAIN, seed)?;
        let secret_key = SecretKey::from_slice(&il[..])
            .map_err(|_| KeyError::KeyUnavailable("seed produced an invalid master key".into()))?;
        Ok(Self {
            secret_key,
            chain_code: ir,
            depth: 0,
        })
    }

    /// Derive one child
    pub fn derive_child(&self, child: ChildNumber) -> Result<Self, KeyError> {
        let index = child.to_index()?;
        let mut data = Zeroizing::new(Vec::with_capacity(37));
        if index >= HARDENED_OFFSET {
            data.push(0x00);
            data.extend_from_slice(&self.secret_key.secret_bytes());
        } else {
            let secp = Secp256k1::new();
            data.extend_from_slice(&PublicKey::from_secret_key(&secp, &self.secret_key).serialize());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let (il, ir) = hmac_split(&self.chain_code[..], &data)?;
        let tweak = Scalar::from_be_bytes(*il)
            .map_err(|_| KeyError::KeyUnavailable(format!("child {} is invalid", index)))?;
        let secret_key = self.secret_key.add_tweak(&tweak)?;

        let depth = self
            .depth
            .checked_add(1)
            .ok_or_else(|| KeyError::KeyUnavailable("derivation depth exhausted".into()))?;
        Ok(Self {
            secret_key,
            chain_code: ir,
            depth,
        })
    }

    /// Derive along a path relative to this node
    pub fn derive_path(&self, path: &[ChildNumber]) -> Result<Self, KeyError> {
        let mut node = self.duplicate();
        for child in path {
            node = node.derive_child(*child)?;
        }
        Ok(node)
    }

    /// The node's key as a compressed key pair
    pub fn to_key_pair(&self) -> KeyPair {
        KeyPair::from_secret_key(self.secret_key, true)
    }

    pub fn chain_code(&self) -> &[u8; 32] {
        &self.chain_code
    }

    fn duplicate(&self) -> Self {
        Self {
            secret_key: self.secret_key,
            chain_code: self.chain_code.clone(),
            depth: self.depth,
        }
    }
}

impl Drop for ExtendedPrivKey {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}

fn hmac_split(
    key: &[u8],
    data: &[u8],
) -> Result<(Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>), KeyError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
        .map_err(|e| KeyError::KeyUnavailable(format!("HMAC key rejected: {}", e)))?;
    mac.update(data);
    let mut output = Zeroizing::new([0u8; 64]);
    output.copy_from_slice(&mac.finalize().into_bytes());

    let mut il = Zeroizing::new([0u8; 32]);
    let mut ir = Zeroizing::new([0u8; 32]);
    il.copy_from_slice(&output[..32]);
    ir.copy_from_slice(&output[32..]);
    Ok((il, ir))
}
