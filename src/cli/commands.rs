//! CLI commands for the vault
//!
//! Offline tooling: key handling, message signing, check payloads, and
//! multisig and CLTV script construction.

use std::path::Path;

use crate::check::CheckPayload;
use crate::config::VaultConfig;
use crate::crypto::keys::KeyPair;
use crate::crypto::wif::{export_wif, import_wif};
use crate::keychain::KeyMaterial;
use crate::message::{sign_message, verify_message};
use crate::params::{NetworkParams, COIN};
use crate::script::{LockedOutputSpec, MultisigSpec};
use crate::storage::{JsonRecordStore, RecordStore};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub config: VaultConfig,
    pub params: NetworkParams,
}

impl AppState {
    /// Load configuration for a data directory
    pub fn new(data_dir: &Path) -> CliResult<Self> {
        let config = VaultConfig::load(data_dir)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: VaultConfig) -> Self {
        let params = config.params();
        Self { config, params }
    }

    /// Open the record store, creating the data directory if needed
    pub fn store(&self) -> CliResult<JsonRecordStore> {
        Ok(JsonRecordStore::open(self.config.storage())?)
    }
}

fn format_amount(amount: u64) -> String {
    format!("{}.{:08}", amount / COIN, amount % COIN)
}

fn parse_pubkeys(list: &[String]) -> CliResult<Vec<Vec<u8>>> {
    list.iter()
        .flat_map(|item| item.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| hex::decode(s).map_err(|_| format!("public key {} is not hex", s).into()))
        .collect()
}

/// Generate a standalone key
pub fn cmd_key_new(state: &AppState) -> CliResult<()> {
    let key = KeyPair::generate();
    let wif = export_wif(&key, &state.params)?;

    println!("🔐 New key generated ({})", state.params.network);
    println!("   📍 Address: {}", key.address(&state.params));
    println!("   🔑 Public Key: {}", key.public_key_hex());
    println!("   🗝️  WIF: {}", wif.as_str());
    println!("\n   ⚠️  Anyone holding the WIF can spend funds sent to this address.");
    Ok(())
}

/// Derive the key at `index` of a seed's receive chain and print its WIF
pub fn cmd_key_export(state: &AppState, seed_hex: &str, index: u32) -> CliResult<()> {
    let seed = zeroize::Zeroizing::new(
        hex::decode(seed_hex.trim()).map_err(|_| "seed is not hex".to_string())?,
    );
    let keys = KeyMaterial::from_seed(&seed, state.params.clone())?;
    let key = keys.key_at(index)?;
    let wif = export_wif(&key, &state.params)?;

    println!(
        "🔑 Key m/44'/{}'/0'/0/{}",
        state.params.bip44_coin_type, index
    );
    println!("   📍 Address: {}", key.address(&state.params));
    println!("   🗝️  WIF: {}", wif.as_str());
    Ok(())
}

/// Decode a WIF and show what it controls
pub fn cmd_key_import(state: &AppState, wif: &str) -> CliResult<()> {
    let key = import_wif(wif, &state.params)?;

    println!("📥 Imported key");
    println!("   📍 Address: {}", key.address(&state.params));
    println!("   🔑 Public Key: {}", key.public_key_hex());
    println!("   🗜️  Compressed: {}", key.compressed);
    Ok(())
}

pub fn cmd_message_sign(state: &AppState, wif: &str, message: &str) -> CliResult<()> {
    let key = import_wif(wif, &state.params)?;
    let signed = sign_message(&state.params, &key, message)?;
    println!("{}", serde_json::to_string_pretty(&signed)?);
    Ok(())
}

pub fn cmd_message_verify(
    state: &AppState,
    address: &str,
    message: &str,
    signature: &str,
) -> CliResult<()> {
    if verify_message(&state.params, address, message, signature)? {
        println!("✅ Signature is valid for {}", address);
    } else {
        println!("❌ Signature does not match {}", address);
    }
    Ok(())
}

/// Decode a check's QR payload and confirm it reproduces its address
pub fn cmd_check_payload(state: &AppState, text: &str) -> CliResult<()> {
    let payload = CheckPayload::parse(&state.params, text)?;
    let key = payload.key(&state.params)?;

    println!("🧾 Check payload ({} fields)", payload.field_count());
    println!("   🔑 Key address: {}", key.address(&state.params));

    match (&payload.address, payload.locktime) {
        (Some(address), Some(locktime)) => {
            let spec = LockedOutputSpec::new(&state.params, locktime, &key.public_key_bytes())?;
            let matches = spec.address == address.to_string();
            println!("   📍 P2SH Address: {}", address);
            println!("   ⏳ Locktime: {}", locktime);
            if matches {
                println!("   ✅ Key and locktime reproduce the address");
            } else {
                println!("   ❌ Key and locktime produce {} instead", spec.address);
            }
        }
        (Some(address), None) => {
            println!("   📍 P2SH Address: {}", address);
            println!("   ⚠️  Legacy payload without locktime");
        }
        (None, _) => println!("   ⚠️  Legacy payload: key only"),
    }
    Ok(())
}

/// List stored checks
pub fn cmd_check_list(state: &AppState) -> CliResult<()> {
    let checks = state.store()?.checks()?;
    if checks.is_empty() {
        println!("📭 No checks found.");
        return Ok(());
    }

    println!("📋 Checks:");
    for check in &checks {
        println!(
            "   #{} {} DOGE to {} at {} ({:?}, {})",
            check.id,
            format_amount(check.amount),
            check.pay_to,
            check.address,
            check.status,
            check.transaction_hash.as_deref().unwrap_or("unfunded")
        );
    }
    Ok(())
}

/// Build and record an M-of-N multisig address
pub fn cmd_multisig_create(state: &AppState, required: usize, pubkeys: &[String]) -> CliResult<()> {
    let pubkeys = parse_pubkeys(pubkeys)?;
    let spec = MultisigSpec::new(&state.params, required, pubkeys)?;
    let record = state.store()?.insert_multisig(
        spec.required,
        spec.pubkeys.iter().map(hex::encode).collect(),
        spec.redeem_script.to_hex(),
        spec.address.to_string(),
    )?;

    println!("🔐 {} (record #{})", spec.description(), record.id);
    println!("   📍 Address: {}", spec.address);
    println!("   📜 Redeem Script: {}", spec.redeem_script.to_hex());
    println!("   🧩 ASM: {}", spec.redeem_script.to_asm());
    Ok(())
}

/// Print the CLTV redeem script and address for a locktime and key
pub fn cmd_script_cltv(state: &AppState, locktime: u32, pubkey_hex: &str) -> CliResult<()> {
    let pubkey = hex::decode(pubkey_hex.trim()).map_err(|_| "public key is not hex".to_string())?;
    let spec = LockedOutputSpec::new(&state.params, locktime, &pubkey)?;

    let kind = if spec.is_timestamp_lock(&state.params) {
        "timestamp"
    } else {
        "block height"
    };
    println!("⏳ CLTV script (locktime {} as {})", locktime, kind);
    println!("   📍 Address: {}", spec.address);
    println!("   📜 Redeem Script: {}", spec.redeem_script.to_hex());
    println!("   🧩 ASM: {}", spec.redeem_script.to_asm());
    Ok(())
}
