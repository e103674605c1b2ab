//! Signature collection for one multisig spend
//!
//! A session owns an unsigned template and accumulates verified partial
//! signatures per input. Inputs move `Unsigned -> PartiallySigned -> FullySigned`
//! and the session becomes `Ready` once every input is fully signed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::collector::{assemble_script_sig, verify_partial, PartialSignature};
use super::MultisigError;
use crate::script::MultisigSpec;
use crate::transaction::{Transaction, Txid, UnsignedSpend};

/// Signing progress of a single input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputState {
    Unsigned,
    PartiallySigned { have: usize, need: usize },
    FullySigned,
}

/// Lifecycle of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Waiting for more signatures
    AwaitingSignatures,
    /// Every input has enough signatures
    Ready,
    /// Finalized transaction handed to the network
    Broadcast(Txid),
}

/// A multisig spend awaiting cosigner signatures
#[derive(Debug, Clone)]
pub struct MultisigSession {
    /// Txid of the unsigned template
    pub id: Txid,
    pub spec: MultisigSpec,
    pub spend: UnsignedSpend,
    signatures: Vec<Vec<PartialSignature>>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MultisigSession {
    pub fn new(spec: MultisigSpec, spend: UnsignedSpend) -> Self {
        let now = Utc::now();
        let inputs = spend.transaction.inputs.len();
        Self {
            id: spend.transaction.txid(),
            spec,
            spend,
            signatures: vec![Vec::new(); inputs],
            status: SessionStatus::AwaitingSignatures,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn template(&self) -> &Transaction {
        &self.spend.transaction
    }

    /// Hex of the unsigned template, for out-of-band distribution to cosigners
    pub fn template_hex(&self) -> String {
        self.spend.transaction.to_hex()
    }

    /// Verify and record one partial signature
    ///
    /// Invalid signatures are rejected immediately and never stored.
    pub fn add_signature(&mut self, partial: PartialSignature) -> Result<InputState, MultisigError> {
        if let SessionStatus::Broadcast(txid) = &self.status {
            return Err(MultisigError::SessionClosed(txid.to_string()));
        }
        let count = self.signatures.len();
        let index = partial.input_index;
        if index >= count {
            return Err(MultisigError::InputOutOfRange { index, count });
        }
        if self.input_state(index) == InputState::FullySigned {
            return Err(MultisigError::InputComplete(index));
        }
        if self.signatures[index].iter().any(|s| s.pubkey == partial.pubkey) {
            return Err(MultisigError::AlreadySigned {
                input: index,
                pubkey: partial.pubkey_hex(),
            });
        }

        verify_partial(&self.spend.transaction, &self.spec, &partial)?;

        log::debug!(
            "Session {}: input {} signed by {}",
            self.id,
            index,
            partial.pubkey_hex()
        );
        self.signatures[index].push(partial);
        self.updated_at = Utc::now();

        if self.is_ready() {
            self.status = SessionStatus::Ready;
            log::info!("Session {} has all {} signatures", self.id, self.spec.description());
        }
        Ok(self.input_state(index))
    }

    pub fn input_state(&self, index: usize) -> InputState {
        let need = self.spec.required;
        match self.signatures.get(index).map(Vec::len).unwrap_or(0) {
            0 => InputState::Unsigned,
            have if have >= need => InputState::FullySigned,
            have => InputState::PartiallySigned { have, need },
        }
    }

    pub fn input_states(&self) -> Vec<InputState> {
        (0..self.signatures.len()).map(|i| self.input_state(i)).collect()
    }

    pub fn is_ready(&self) -> bool {
        (0..self.signatures.len()).all(|i| self.input_state(i) == InputState::FullySigned)
    }

    /// Pubkeys (hex) that have signed input `index`
    pub fn signed_by(&self, index: usize) -> Vec<String> {
        self.signatures
            .get(index)
            .map(|sigs| sigs.iter().map(PartialSignature::pubkey_hex).collect())
            .unwrap_or_default()
    }

    /// Collected signatures in text form, for handing to another session
    pub fn exported_signatures(&self) -> Vec<String> {
        self.signatures.iter().flatten().map(ToString::to_string).collect()
    }

    /// Produce the redeemable transaction
    pub fn finalize(&self) -> Result<Transaction, MultisigError> {
        let mut tx = self.spend.transaction.clone();
        for (index, signatures) in self.signatures.iter().enumerate() {
            tx.inputs[index].script_sig = assemble_script_sig(&self.spec.redeem_script, signatures)?;
        }
        Ok(tx)
    }

    pub fn mark_broadcast(&mut self, txid: Txid) {
        self.status = SessionStatus::Broadcast(txid);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::multisig::collector::sign_input;
    use crate::params::{NetworkParams, COIN};
    use crate::transaction::{OutPoint, TxOut, Utxo};

    fn session(inputs: u8) -> (Vec<KeyPair>, MultisigSession) {
        let params = NetworkParams::mainnet();
        let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
        let spec = MultisigSpec::new(&params, 2, keys.iter().map(KeyPair::public_key_bytes).collect()).unwrap();

        let spent: Vec<Utxo> = (0..inputs)
            .map(|i| {
                Utxo::new(
                    OutPoint::new(Txid::from_internal([i; 32]), 0),
                    TxOut::new(5 * COIN, spec.script_pubkey()),
                )
            })
            .collect();
        let mut builder = Transaction::builder();
        for utxo in &spent {
            builder = builder.add_input(utxo);
        }
        let transaction = builder.add_output(spec.script_pubkey(), 4 * COIN).build();
        let spend = UnsignedSpend {
            fee: spent.iter().map(Utxo::value).sum::<u64>() - 4 * COIN,
            transaction,
            spent,
        };
        (keys, MultisigSession::new(spec, spend))
    }

    fn sign(session: &MultisigSession, index: usize, key: &KeyPair) -> PartialSignature {
        sign_input(session.template(), index, &session.spec.redeem_script, key).unwrap()
    }

    #[test]
    fn test_state_machine() {
        let (keys, mut session) = session(1);
        assert_eq!(session.input_state(0), InputState::Unsigned);

        let partial = sign(&session, 0, &keys[1]);
        assert_eq!(
            session.add_signature(partial).unwrap(),
            InputState::PartiallySigned { have: 1, need: 2 }
        );
        assert_eq!(session.status, SessionStatus::AwaitingSignatures);
        assert!(session.finalize().is_err());

        let partial = sign(&session, 0, &keys[0]);
        assert_eq!(session.add_signature(partial).unwrap(), InputState::FullySigned);
        assert_eq!(session.status, SessionStatus::Ready);

        let tx = session.finalize().unwrap();
        assert!(tx.is_fully_signed());
        assert_eq!(tx.inputs[0].previous_output, session.template().inputs[0].previous_output);
    }

    #[test]
    fn test_rejects_duplicates_invalid_and_extra() {
        let (keys, mut session) = session(1);
        let partial = sign(&session, 0, &keys[0]);
        session.add_signature(partial.clone()).unwrap();
        assert!(matches!(
            session.add_signature(partial),
            Err(MultisigError::AlreadySigned { input: 0, .. })
        ));

        let mut forged = sign(&session, 0, &keys[1]);
        forged.pubkey = keys[2].public_key_bytes();
        assert!(matches!(
            session.add_signature(forged),
            Err(MultisigError::InvalidPartialSignature(_))
        ));
        assert_eq!(session.signed_by(0).len(), 1);

        session.add_signature(sign(&session, 0, &keys[1])).unwrap();
        assert!(matches!(
            session.add_signature(sign(&session, 0, &keys[2])),
            Err(MultisigError::InputComplete(0))
        ));
        let mut misplaced = sign(&session, 0, &keys[2]);
        misplaced.input_index = 3;
        assert!(matches!(
            session.add_signature(misplaced),
            Err(MultisigError::InputOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn test_every_input_must_be_signed() {
        let (keys, mut session) = session(2);
        session.add_signature(sign(&session, 0, &keys[0])).unwrap();
        session.add_signature(sign(&session, 0, &keys[1])).unwrap();
        assert!(!session.is_ready());
        assert!(matches!(
            session.finalize(),
            Err(MultisigError::SignatureCountMismatch { have: 0, need: 2 })
        ));

        session.add_signature(sign(&session, 1, &keys[2])).unwrap();
        session.add_signature(sign(&session, 1, &keys[0])).unwrap();
        assert_eq!(
            session.input_states(),
            vec![InputState::FullySigned, InputState::FullySigned]
        );
        assert!(session.finalize().unwrap().is_fully_signed());
    }

    #[test]
    fn test_closed_after_broadcast() {
        let (keys, mut session) = session(1);
        let id = session.id;
        session.mark_broadcast(id);
        assert!(matches!(
            session.add_signature(sign(&session, 0, &keys[0])),
            Err(MultisigError::SessionClosed(_))
        ));
    }
}
