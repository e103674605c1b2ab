//! Transaction assembly
//!
//! Three shapes of transaction leave the wallet:
//! - Funding: wallet P2PKH inputs paying an address, signed immediately
//! - Multisig spend: unsigned inputs from a P2SH multisig address, handed
//!   to the signature collector
//! - CLTV redeem: every output of a check address swept after its locktime

use super::fee::{estimate_size, FeeRate, InputKind, CLTV_FEE_BUFFER_PERCENT};
use super::sign::{input_signature, p2pkh_script_sig, single_key_p2sh_script_sig};
use super::tx::{Transaction, SEQUENCE_FINAL, SEQUENCE_LOCKTIME_ENABLED};
use super::utxo::{filter_spendable, spent_outpoints, Utxo};
use super::TransactionError;
use crate::crypto::keys::KeyPair;
use crate::params::{NetworkParams, MAX_MONEY};
use crate::script::{Address, LockedOutputSpec, MultisigSpec};
use crate::wallet::{OwnedUtxo, Wallet, WalletError};

/// An unsigned spend and the outputs it consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedSpend {
    pub transaction: Transaction,
    /// Outputs spent by each input, in input order
    pub spent: Vec<Utxo>,
    pub fee: u64,
}

impl UnsignedSpend {
    pub fn total_input(&self) -> u64 {
        self.spent.iter().map(Utxo::value).sum()
    }
}

/// Builds transactions for one network at one fee rate
pub struct TransactionAssembler<'a> {
    params: &'a NetworkParams,
    fee_rate: FeeRate,
}

impl<'a> TransactionAssembler<'a> {
    pub fn new(params: &'a NetworkParams) -> Self {
        Self {
            params,
            fee_rate: FeeRate::per_kb(params.default_fee_per_kb),
        }
    }

    pub fn with_fee_rate(mut self, fee_rate: FeeRate) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn fee_rate(&self) -> FeeRate {
        self.fee_rate
    }

    /// Pay `amount` to `destination` from the wallet's own outputs
    ///
    /// Inputs are chosen largest first until `amount + fee` is covered;
    /// change below the dust limit is left to the fee.
    pub fn build_funding_transaction(
        &self,
        wallet: &Wallet,
        destination: &Address,
        amount: u64,
    ) -> Result<Transaction, TransactionError> {
        if wallet.is_locked() {
            return Err(TransactionError::WalletLocked);
        }
        self.check_amount(amount)?;

        let available = wallet.spendable_utxos();
        let (selected, fee) = self.select_coins(&available, amount, InputKind::P2pkh)?;
        let total = sum_values(&selected)?;

        let mut builder = Transaction::builder().add_output(destination.script_pubkey(), amount);
        let change = total - amount - fee;
        if change >= self.params.dust_limit {
            let change_address = wallet.change_address()?;
            builder = builder.add_output(change_address.script_pubkey(), change);
        }
        for owned in &selected {
            builder = builder.add_input_with_sequence(&owned.utxo, SEQUENCE_FINAL);
        }
        let mut tx = builder.build();

        for (index, owned) in selected.iter().enumerate() {
            let key = wallet.key_at(owned.key_index).map_err(|e| match e {
                WalletError::Locked => TransactionError::WalletLocked,
                WalletError::Key(k) => TransactionError::Key(k),
                other => TransactionError::Signing(other.to_string()),
            })?;
            let signature = input_signature(&tx, index, owned.utxo.script_pubkey(), &key)?;
            tx.inputs[index].script_sig = p2pkh_script_sig(&signature, &key.public_key_bytes());
        }

        log::info!(
            "Built funding transaction {} paying {} to {} ({} inputs, fee {})",
            tx.txid(),
            amount,
            destination,
            selected.len(),
            fee
        );
        Ok(tx)
    }

    /// Unsigned spend of `amount` from a multisig address
    ///
    /// Candidates are outputs in `known_utxos` paying the multisig's P2SH
    /// script that none of `known_transactions` already consumes. Every
    /// candidate becomes an input, in the order given.
    pub fn build_unsigned_spend_from_multisig(
        &self,
        spec: &MultisigSpec,
        destination: &Address,
        amount: u64,
        known_utxos: &[Utxo],
        known_transactions: &[Transaction],
        change_address: &Address,
    ) -> Result<UnsignedSpend, TransactionError> {
        self.check_amount(amount)?;

        let spent = spent_outpoints(known_transactions);
        // inputs stay in scan order
        let candidates = filter_spendable(known_utxos, &spec.script_pubkey(), &spent);
        if candidates.is_empty() {
            return Err(TransactionError::NoSpendableOutputs(spec.address.to_string()));
        }

        let kind = InputKind::Multisig {
            required: spec.required,
            total: spec.total(),
        };
        let total = sum_values(&candidates)?;
        // destination plus change
        let fee = self
            .fee_rate
            .fee_for_size(estimate_size(&vec![kind; candidates.len()], 2));
        let required = amount.saturating_add(fee);
        if total < required {
            return Err(TransactionError::InsufficientFunds {
                available: total,
                required,
            });
        }

        let mut builder = Transaction::builder().add_output(destination.script_pubkey(), amount);
        let change = total - required;
        if change >= self.params.dust_limit {
            builder = builder.add_output(change_address.script_pubkey(), change);
        }
        for utxo in &candidates {
            builder = builder.add_input_with_sequence(utxo, SEQUENCE_FINAL);
        }
        let transaction = builder.build();
        let fee = total - transaction.total_output();

        log::info!(
            "Built unsigned {} spend {} of {} to {} ({} inputs)",
            spec.description(),
            transaction.txid(),
            amount,
            destination,
            candidates.len()
        );
        Ok(UnsignedSpend {
            transaction,
            spent: candidates,
            fee,
        })
    }

    /// Sweep every output of a check address to `destination`
    ///
    /// `now` is the current Unix time. Timestamp locks that have not yet
    /// passed are refused unless `allow_early` is set, in which case the
    /// transaction is built for the caller to hold until it becomes valid.
    pub fn build_cltv_redeem(
        &self,
        spec: &LockedOutputSpec,
        key: &KeyPair,
        utxos: &[Utxo],
        destination: &Address,
        now: i64,
        allow_early: bool,
    ) -> Result<Transaction, TransactionError> {
        if key.public_key_hex() != spec.unlock_pubkey {
            return Err(TransactionError::KeyMismatch);
        }
        if spec.is_timestamp_lock(self.params) && now < spec.locktime as i64 && !allow_early {
            return Err(TransactionError::TimelockNotReached {
                locktime: spec.locktime,
                now,
            });
        }

        let inputs = filter_spendable(utxos, &spec.script_pubkey, &Default::default());
        if inputs.is_empty() {
            return Err(TransactionError::NoSpendableOutputs(spec.address.clone()));
        }

        let total = sum_values(&inputs)?;
        let size = estimate_size(&vec![InputKind::Cltv; inputs.len()], 1);
        let fee = self.fee_rate.fee_with_buffer(size, CLTV_FEE_BUFFER_PERCENT);
        if total <= fee || total - fee < self.params.dust_limit {
            return Err(TransactionError::InsufficientFunds {
                available: total,
                required: fee.saturating_add(self.params.dust_limit),
            });
        }

        let mut builder = Transaction::builder()
            .add_output(destination.script_pubkey(), total - fee)
            .lock_time(spec.locktime);
        for utxo in &inputs {
            builder = builder.add_input_with_sequence(utxo, SEQUENCE_LOCKTIME_ENABLED);
        }
        let mut tx = builder.build();

        for index in 0..tx.inputs.len() {
            let signature = input_signature(&tx, index, &spec.redeem_script, key)?;
            tx.inputs[index].script_sig = single_key_p2sh_script_sig(&signature, &spec.redeem_script);
        }

        log::info!(
            "Built CLTV redeem {} sweeping {} from {} (fee {})",
            tx.txid(),
            total,
            spec.address,
            fee
        );
        Ok(tx)
    }

    /// Sweep every P2PKH output of `key` to `destination`
    ///
    /// Used for check payloads that carry a bare key without lock details.
    pub fn build_key_sweep(
        &self,
        key: &KeyPair,
        utxos: &[Utxo],
        destination: &Address,
    ) -> Result<Transaction, TransactionError> {
        let script_pubkey = Address::p2pkh(self.params, &key.public_key_bytes()).script_pubkey();
        let inputs = filter_spendable(utxos, &script_pubkey, &Default::default());
        if inputs.is_empty() {
            return Err(TransactionError::NoSpendableOutputs(key.address(self.params)));
        }

        let total = sum_values(&inputs)?;
        let fee = self
            .fee_rate
            .fee_for_size(estimate_size(&vec![InputKind::P2pkh; inputs.len()], 1));
        if total <= fee || total - fee < self.params.dust_limit {
            return Err(TransactionError::InsufficientFunds {
                available: total,
                required: fee.saturating_add(self.params.dust_limit),
            });
        }

        let mut builder = Transaction::builder().add_output(destination.script_pubkey(), total - fee);
        for utxo in &inputs {
            builder = builder.add_input_with_sequence(utxo, SEQUENCE_FINAL);
        }
        let mut tx = builder.build();

        for index in 0..tx.inputs.len() {
            let signature = input_signature(&tx, index, &script_pubkey, key)?;
            tx.inputs[index].script_sig = p2pkh_script_sig(&signature, &key.public_key_bytes());
        }

        log::info!(
            "Built key sweep {} of {} from {} (fee {})",
            tx.txid(),
            total,
            key.address(self.params),
            fee
        );
        Ok(tx)
    }

    fn check_amount(&self, amount: u64) -> Result<(), TransactionError> {
        if amount == 0 {
            return Err(TransactionError::InvalidAmount("amount must be positive".to_string()));
        }
        if amount < self.params.dust_limit {
            return Err(TransactionError::InvalidAmount(format!(
                "amount {} is below the dust limit {}",
                amount, self.params.dust_limit
            )));
        }
        if amount > MAX_MONEY {
            return Err(TransactionError::InvalidAmount(format!(
                "amount {} exceeds the money range {}",
                amount, MAX_MONEY
            )));
        }
        Ok(())
    }

    /// Largest-first selection over `candidates`, which must already be sorted
    fn select_coins<T: SpendableValue + Clone>(
        &self,
        candidates: &[T],
        amount: u64,
        kind: InputKind,
    ) -> Result<(Vec<T>, u64), TransactionError> {
        let mut selected = Vec::new();
        let mut total = 0u64;
        let mut fee = 0u64;

        for candidate in candidates {
            selected.push(candidate.clone());
            total = total.saturating_add(candidate.spendable_value());
            // destination plus change
            fee = self
                .fee_rate
                .fee_for_size(estimate_size(&vec![kind; selected.len()], 2));
            if total >= amount.saturating_add(fee) {
                return Ok((selected, fee));
            }
        }

        Err(TransactionError::InsufficientFunds {
            available: total,
            required: amount.saturating_add(fee),
        })
    }
}

/// Sum of output values, refusing totals outside the money range
fn sum_values<T: SpendableValue>(outputs: &[T]) -> Result<u64, TransactionError> {
    outputs
        .iter()
        .try_fold(0u64, |total, o| total.checked_add(o.spendable_value()))
        .filter(|total| *total <= MAX_MONEY)
        .ok_or_else(|| TransactionError::InvalidAmount("input total exceeds the money range".to_string()))
}

trait SpendableValue {
    fn spendable_value(&self) -> u64;
}

impl SpendableValue for Utxo {
    fn spendable_value(&self) -> u64 {
        self.value()
    }
}

impl SpendableValue for OwnedUtxo {
    fn spendable_value(&self) -> u64 {
        self.utxo.value()
    }
}
