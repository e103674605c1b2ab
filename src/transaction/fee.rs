//! Fee rates and transaction size estimates
//!
//! Fees are charged per started kilobyte fraction: `rate * size / 1000`,
//! rounded up so a transaction never pays below the configured rate.

use serde::{Deserialize, Serialize};

use crate::params::DEFAULT_FEE_PER_KB;

// =============================================================================
// Size Constants
// =============================================================================

/// Version, counts and locktime of a transaction with few inputs
pub const TX_BASE_SIZE: usize = 10;

/// Standard P2PKH output
pub const OUTPUT_SIZE: usize = 34;

/// P2PKH input with a compressed key
pub const P2PKH_INPUT_SIZE: usize = 148;

/// P2SH input spending a CLTV redeem script
pub const CLTV_INPUT_SIZE: usize = 241;

/// Extra margin added to CLTV redeem fees, in percent
pub const CLTV_FEE_BUFFER_PERCENT: u64 = 20;

// =============================================================================
// Fee Rate
// =============================================================================

/// Fee rate in smallest units per 1000 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeeRate(pub u64);

impl FeeRate {
    pub fn per_kb(rate: u64) -> Self {
        Self(rate)
    }

    /// Calculate fee for a given size
    pub fn fee_for_size(&self, size_bytes: usize) -> u64 {
        let scaled = self.0.saturating_mul(size_bytes as u64);
        scaled / 1000 + u64::from(scaled % 1000 != 0)
    }

    /// Fee for `size_bytes` plus a percentage margin
    pub fn fee_with_buffer(&self, size_bytes: usize, buffer_percent: u64) -> u64 {
        let fee = self.fee_for_size(size_bytes);
        fee.saturating_add(fee.saturating_mul(buffer_percent) / 100)
    }

    pub fn as_per_kb(&self) -> u64 {
        self.0
    }
}

impl Default for FeeRate {
    fn default() -> Self {
        Self(DEFAULT_FEE_PER_KB)
    }
}

// =============================================================================
// Size Estimation
// =============================================================================

/// Shape of an input, for size estimation before signing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    P2pkh,
    Cltv,
    /// P2SH input spending an M-of-N redeem script with compressed keys
    Multisig { required: usize, total: usize },
}

impl InputKind {
    pub fn estimated_size(&self) -> usize {
        match self {
            InputKind::P2pkh => P2PKH_INPUT_SIZE,
            InputKind::Cltv => CLTV_INPUT_SIZE,
            // outpoint, sequence, script length, OP_0, M signatures, redeem script push
            InputKind::Multisig { required, total } => 49 + 74 * required + 34 * total,
        }
    }
}

/// Estimated serialized size of a signed transaction
pub fn estimate_size(inputs: &[InputKind], outputs: usize) -> usize {
    TX_BASE_SIZE
        + inputs.iter().map(InputKind::estimated_size).sum::<usize>()
        + outputs * OUTPUT_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rounding() {
        let rate = FeeRate::per_kb(1_000_000);
        assert_eq!(rate.fee_for_size(1000), 1_000_000);
        assert_eq!(rate.fee_for_size(226), 226_000);

        let odd = FeeRate::per_kb(999);
        assert_eq!(odd.fee_for_size(1), 1);
        assert_eq!(odd.fee_for_size(0), 0);
    }

    #[test]
    fn test_cltv_fee_buffer() {
        let rate = FeeRate::default();
        let size = estimate_size(&[InputKind::Cltv], 1);
        assert_eq!(size, 10 + 241 + 34);
        assert_eq!(rate.fee_with_buffer(size, CLTV_FEE_BUFFER_PERCENT), 285_000 + 57_000);
    }

    #[test]
    fn test_multisig_input_estimate() {
        let two_of_three = InputKind::Multisig {
            required: 2,
            total: 3,
        };
        assert_eq!(two_of_three.estimated_size(), 49 + 148 + 102);
        assert!(estimate_size(&[two_of_three, InputKind::P2pkh], 2) > 400);
    }
}
