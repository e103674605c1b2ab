//! Unspent outputs and the scans that find them

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::tx::{OutPoint, Transaction, TxOut};
use crate::script::Script;

/// An output available to be spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub output: TxOut,
}

impl Utxo {
    pub fn new(outpoint: OutPoint, output: TxOut) -> Self {
        Self { outpoint, output }
    }

    pub fn value(&self) -> u64 {
        self.output.value
    }

    pub fn script_pubkey(&self) -> &Script {
        &self.output.script_pubkey
    }
}

/// Every outpoint consumed by one of `transactions`
pub fn spent_outpoints(transactions: &[Transaction]) -> HashSet<OutPoint> {
    transactions
        .iter()
        .flat_map(|tx| tx.inputs.iter().map(|input| input.previous_output))
        .collect()
}

/// Outputs of `transactions` paying `script_pubkey` that none of them spends
pub fn unspent_outputs_paying(script_pubkey: &Script, transactions: &[Transaction]) -> Vec<Utxo> {
    let spent = spent_outpoints(transactions);
    let mut seen = HashSet::new();
    transactions
        .iter()
        .flat_map(|tx| {
            let txid = tx.txid();
            tx.outputs
                .iter()
                .enumerate()
                .map(move |(vout, output)| Utxo::new(OutPoint::new(txid, vout as u32), output.clone()))
        })
        .filter(|utxo| {
            utxo.script_pubkey() == script_pubkey
                && !spent.contains(&utxo.outpoint)
                && seen.insert(utxo.outpoint)
        })
        .collect()
}

/// Candidates paying `script_pubkey`, minus anything in `spent`, without duplicates
pub fn filter_spendable(candidates: &[Utxo], script_pubkey: &Script, spent: &HashSet<OutPoint>) -> Vec<Utxo> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter(|utxo| {
            utxo.value() > 0
                && utxo.script_pubkey() == script_pubkey
                && !spent.contains(&utxo.outpoint)
                && seen.insert(utxo.outpoint)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::p2sh_script_pubkey;
    use crate::transaction::tx::{TxIn, SEQUENCE_FINAL};

    fn funding(script: &Script, values: &[u64]) -> Transaction {
        Transaction::new(
            vec![TxIn::new(OutPoint::new(Default::default(), 0), SEQUENCE_FINAL)],
            values.iter().map(|v| TxOut::new(*v, script.clone())).collect(),
        )
    }

    #[test]
    fn test_scan_excludes_spent_outputs() {
        let watched = p2sh_script_pubkey(&[9u8; 20]);
        let other = p2sh_script_pubkey(&[8u8; 20]);

        let fund = funding(&watched, &[100, 200]);
        let mut unrelated = funding(&other, &[300]);
        unrelated.inputs[0].previous_output = OutPoint::new(fund.txid(), 1);

        let found = unspent_outputs_paying(&watched, &[fund.clone(), unrelated]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].outpoint, OutPoint::new(fund.txid(), 0));
        assert_eq!(found[0].value(), 100);
    }

    #[test]
    fn test_filter_spendable_dedupes() {
        let watched = p2sh_script_pubkey(&[9u8; 20]);
        let fund = funding(&watched, &[100, 0]);
        let utxo = Utxo::new(OutPoint::new(fund.txid(), 0), fund.outputs[0].clone());
        let empty = Utxo::new(OutPoint::new(fund.txid(), 1), fund.outputs[1].clone());

        let found = filter_spendable(&[utxo.clone(), utxo.clone(), empty], &watched, &HashSet::new());
        assert_eq!(found, vec![utxo.clone()]);

        let spent: HashSet<_> = [utxo.outpoint].into_iter().collect();
        assert!(filter_spendable(&[utxo], &watched, &spent).is_empty());
    }
}
