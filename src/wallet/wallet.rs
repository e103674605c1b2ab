//! The wallet's own funds
//!
//! Tracks outputs paying keys issued by the keychain, outputs paying
//! watched scripts (checks, multisig addresses) and the transactions the
//! wallet has registered for broadcast.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::tracker::{RelevanceTracker, TrackerError};
use super::WalletError;
use crate::crypto::keys::{KeyError, KeyPair};
use crate::keychain::{KeyMaterial, KeyPurpose};
use crate::params::NetworkParams;
use crate::script::{Address, AddressKind, Script};
use crate::transaction::{OutPoint, Transaction, Txid, Utxo};

/// A spendable output and the keychain index of the key that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedUtxo {
    pub utxo: Utxo,
    pub key_index: u32,
}

#[derive(Default)]
struct WalletState {
    /// HASH160 of issued pubkeys → keychain index
    owned_keys: HashMap<[u8; 20], u32>,
    utxos: BTreeMap<OutPoint, OwnedUtxo>,
    watched: HashSet<Script>,
    watched_outputs: BTreeMap<OutPoint, Utxo>,
    spent: HashSet<OutPoint>,
    transactions: HashMap<Txid, Transaction>,
}

/// Serializable wallet data for persistence; never includes the seed
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub label: Option<String>,
    pub next_index: u32,
    pub utxos: Vec<OwnedUtxo>,
    pub watched_scripts: Vec<Script>,
    pub watched_outputs: Vec<Utxo>,
    pub transactions: Vec<Transaction>,
}

/// A deterministic wallet over one keychain account
pub struct Wallet {
    keys: KeyMaterial,
    /// Optional label for the wallet
    pub label: Option<String>,
    state: RwLock<WalletState>,
}

impl Wallet {
    pub fn new(keys: KeyMaterial) -> Self {
        Self {
            keys,
            label: None,
            state: RwLock::new(WalletState::default()),
        }
    }

    /// Rebuild a wallet from a snapshot and the keychain it was taken from
    pub fn restore(keys: KeyMaterial, snapshot: WalletSnapshot) -> Self {
        let keys = keys.with_next_index(snapshot.next_index);
        let wallet = Self::new(keys);
        {
            let mut state = wallet.write_state();
            for owned in snapshot.utxos {
                state.utxos.insert(owned.utxo.outpoint, owned);
            }
            state.watched.extend(snapshot.watched_scripts);
            for utxo in snapshot.watched_outputs {
                state.watched_outputs.insert(utxo.outpoint, utxo);
            }
            for tx in snapshot.transactions {
                state
                    .spent
                    .extend(tx.inputs.iter().map(|input| input.previous_output));
                state.transactions.insert(tx.txid(), tx);
            }
        }
        Self {
            label: snapshot.label,
            ..wallet
        }
    }

    pub fn snapshot(&self) -> WalletSnapshot {
        let state = self.read_state();
        WalletSnapshot {
            label: self.label.clone(),
            next_index: self.keys.issued_count(),
            utxos: state.utxos.values().cloned().collect(),
            watched_scripts: state.watched.iter().cloned().collect(),
            watched_outputs: state.watched_outputs.values().cloned().collect(),
            transactions: state.transactions.values().cloned().collect(),
        }
    }

    /// Save wallet state to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), WalletError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load wallet state from a JSON file
    pub fn load(path: &Path, keys: KeyMaterial) -> Result<Self, WalletError> {
        let json = fs::read_to_string(path)?;
        let snapshot: WalletSnapshot = serde_json::from_str(&json)?;
        Ok(Self::restore(keys, snapshot))
    }

    pub fn params(&self) -> &NetworkParams {
        self.keys.params()
    }

    pub fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    pub fn is_locked(&self) -> bool {
        self.keys.is_locked()
    }

    /// Key for a keychain index, failing while the wallet is locked
    pub fn key_at(&self, index: u32) -> Result<KeyPair, WalletError> {
        if self.is_locked() {
            return Err(WalletError::Locked);
        }
        Ok(self.keys.key_at(index)?)
    }

    /// Issue a fresh receive address and remember it as ours
    pub fn receive_address(&self) -> Result<Address, KeyError> {
        self.issue()
    }

    /// Issue a fresh address for change outputs
    pub fn change_address(&self) -> Result<Address, KeyError> {
        self.issue()
    }

    /// Key for `purpose`, failing with `Locked` rather than a key error
    pub fn key_for(&self, purpose: KeyPurpose) -> Result<KeyPair, WalletError> {
        if self.is_locked() {
            return Err(WalletError::Locked);
        }
        Ok(self.keys.derive_or_fetch_key(purpose)?)
    }

    fn issue(&self) -> Result<Address, KeyError> {
        let (index, key) = self.keys.fresh_key()?;
        let hash = key.pubkey_hash();
        self.write_state().owned_keys.insert(hash, index);
        Ok(Address::from_hash(self.params(), AddressKind::P2pkh, hash))
    }

    /// Outputs the standard signing path can spend, largest first
    pub fn spendable_utxos(&self) -> Vec<OwnedUtxo> {
        let mut utxos: Vec<OwnedUtxo> = self.read_state().utxos.values().cloned().collect();
        utxos.sort_by(|a, b| b.utxo.value().cmp(&a.utxo.value()));
        utxos
    }

    /// Sum of spendable outputs
    pub fn balance(&self) -> u64 {
        self.read_state().utxos.values().map(|o| o.utxo.value()).sum()
    }

    /// Unspent outputs paying a watched script
    pub fn watched_outputs(&self, script_pubkey: &Script) -> Vec<Utxo> {
        self.read_state()
            .watched_outputs
            .values()
            .filter(|utxo| utxo.script_pubkey() == script_pubkey)
            .cloned()
            .collect()
    }

    /// Every transaction registered with this wallet
    pub fn known_transactions(&self) -> Vec<Transaction> {
        self.read_state().transactions.values().cloned().collect()
    }

    pub fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.read_state().transactions.get(txid).cloned()
    }

    fn owner_of(&self, script_pubkey: &Script) -> Option<u32> {
        let hash = script_pubkey.p2pkh_hash()?;
        if let Some(index) = self.read_state().owned_keys.get(&hash) {
            return Some(*index);
        }
        let index = self.keys.find_issued(&hash)?;
        self.write_state().owned_keys.insert(hash, index);
        Some(index)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, WalletState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RelevanceTracker for Wallet {
    fn watch_script(&self, script_pubkey: &Script) -> Result<(), TrackerError> {
        if self.write_state().watched.insert(script_pubkey.clone()) {
            log::debug!("Wallet now watches {}", script_pubkey.to_hex());
        }
        Ok(())
    }

    fn is_watched(&self, script_pubkey: &Script) -> bool {
        self.read_state().watched.contains(script_pubkey)
    }

    /// Apply a transaction: consumed outputs leave the wallet, outputs to
    /// our keys or watched scripts join it
    fn register_transaction(&self, tx: &Transaction) -> Result<(), TrackerError> {
        let txid = tx.txid();
        // Resolve owners before taking the write lock; resolution may touch the cache
        let owners: Vec<Option<u32>> = tx
            .outputs
            .iter()
            .map(|output| self.owner_of(&output.script_pubkey))
            .collect();

        let mut state = self.write_state();
        for input in &tx.inputs {
            state.spent.insert(input.previous_output);
            state.utxos.remove(&input.previous_output);
            state.watched_outputs.remove(&input.previous_output);
        }

        let mut received = 0u64;
        for (vout, (output, owner)) in tx.outputs.iter().zip(owners).enumerate() {
            let outpoint = OutPoint::new(txid, vout as u32);
            if state.spent.contains(&outpoint) {
                continue;
            }
            let utxo = Utxo::new(outpoint, output.clone());
            if let Some(key_index) = owner {
                received += output.value;
                state.utxos.insert(outpoint, OwnedUtxo { utxo, key_index });
            } else if state.watched.contains(&output.script_pubkey) {
                state.watched_outputs.insert(outpoint, utxo);
            }
        }
        state.transactions.insert(txid, tx.clone());
        log::info!(
            "Registered transaction {} ({} inputs, {} to own keys)",
            txid,
            tx.inputs.len(),
            received
        );
        Ok(())
    }
}
