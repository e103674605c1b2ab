//! Network parameters
//!
//! Version bytes, message prefix and fee defaults for the chain the core
//! operates on. Every operation that depends on any of these takes a
//! `&NetworkParams` explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Smallest units per coin
pub const COIN: u64 = 100_000_000;

/// Largest amount any single value may carry (10 billion coins)
pub const MAX_MONEY: u64 = 10_000_000_000 * COIN;

/// Locktime threshold: values below are block heights, above are timestamps
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// Default fee rate (1 DOGE per kB, in smallest units)
pub const DEFAULT_FEE_PER_KB: u64 = 1_000_000;

/// Outputs below this value are not relayed
pub const DEFAULT_DUST_LIMIT: u64 = 1_000_000;

// =============================================================================
// Network
// =============================================================================

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

// =============================================================================
// Network Parameters
// =============================================================================

/// Chain-specific constants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    pub network: Network,
    /// Base58 version byte for pay-to-pubkey-hash addresses
    pub p2pkh_version: u8,
    /// Base58 version byte for pay-to-script-hash addresses
    pub p2sh_version: u8,
    /// Base58 version byte for WIF private keys
    pub wif_version: u8,
    /// BIP44 coin type used for the account path
    pub bip44_coin_type: u32,
    /// Prefix mixed into signed-message digests
    pub message_prefix: String,
    /// Fee rate used when the caller does not supply one
    pub default_fee_per_kb: u64,
    /// Minimum value for a change output
    pub dust_limit: u64,
    pub locktime_threshold: u32,
}

impl NetworkParams {
    /// Dogecoin mainnet
    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            p2pkh_version: 0x1e,
            p2sh_version: 0x16,
            wif_version: 0x9e,
            bip44_coin_type: 3,
            message_prefix: "Dogecoin Signed Message:\n".to_string(),
            default_fee_per_kb: DEFAULT_FEE_PER_KB,
            dust_limit: DEFAULT_DUST_LIMIT,
            locktime_threshold: LOCKTIME_THRESHOLD,
        }
    }

    /// Dogecoin testnet
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            p2pkh_version: 0x71,
            p2sh_version: 0xc4,
            wif_version: 0xf1,
            bip44_coin_type: 1,
            ..Self::mainnet()
        }
    }

    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
        }
    }

    /// Whether a locktime is read as a Unix timestamp rather than a height
    pub fn is_timestamp_locktime(&self, locktime: u32) -> bool {
        locktime >= self.locktime_threshold
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_parsing() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("TEST".parse::<Network>().unwrap(), Network::Testnet);
        assert!("regtest".parse::<Network>().is_err());
    }

    #[test]
    fn test_testnet_inherits_message_prefix() {
        let params = NetworkParams::testnet();
        assert_eq!(params.message_prefix, "Dogecoin Signed Message:\n");
        assert_eq!(params.p2sh_version, 0xc4);
        assert_eq!(NetworkParams::for_network(Network::Mainnet).wif_version, 0x9e);
    }

    #[test]
    fn test_locktime_threshold() {
        let params = NetworkParams::mainnet();
        assert!(!params.is_timestamp_locktime(499_999_999));
        assert!(params.is_timestamp_locktime(1_700_000_000));
    }
}
