//! Multisig address registry and signing sessions
//!
//! Sessions are keyed by template txid. Each session sits behind its own
//! mutex so submissions for one spend are serialized while different spends
//! proceed independently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::collector::PartialSignature;
use super::session::{InputState, MultisigSession, SessionStatus};
use super::MultisigError;
use crate::script::MultisigSpec;
use crate::transaction::{Transaction, Txid, UnsignedSpend};

/// Summary of a session for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: Txid,
    pub address: String,
    pub inputs: Vec<InputState>,
    pub status: SessionStatus,
}

/// In-memory registry of multisig addresses and open sessions
#[derive(Default)]
pub struct MultisigSessions {
    /// Multisig specs by P2SH address
    specs: RwLock<HashMap<String, MultisigSpec>>,
    sessions: RwLock<HashMap<Txid, Arc<Mutex<MultisigSession>>>>,
}

impl MultisigSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a multisig address; registering the same spec twice is a no-op
    pub async fn register_spec(&self, spec: MultisigSpec) -> MultisigSpec {
        let mut specs = self.specs.write().await;
        specs
            .entry(spec.address.to_string())
            .or_insert_with(|| {
                log::info!("Registered {} at {}", spec.description(), spec.address);
                spec
            })
            .clone()
    }

    pub async fn spec(&self, address: &str) -> Option<MultisigSpec> {
        self.specs.read().await.get(address).cloned()
    }

    pub async fn specs(&self) -> Vec<MultisigSpec> {
        self.specs.read().await.values().cloned().collect()
    }

    pub async fn is_multisig_address(&self, address: &str) -> bool {
        self.specs.read().await.contains_key(address)
    }

    /// Open a session for a template, returning its id
    ///
    /// Opening the same template again returns the existing session.
    pub async fn open(&self, spec: MultisigSpec, spend: UnsignedSpend) -> Txid {
        let session = MultisigSession::new(spec.clone(), spend);
        let id = session.id;
        self.register_spec(spec).await;

        let mut sessions = self.sessions.write().await;
        sessions.entry(id).or_insert_with(|| {
            log::info!(
                "Opened signing session {} for {} ({} inputs)",
                id,
                session.spec.address,
                session.template().inputs.len()
            );
            Arc::new(Mutex::new(session))
        });
        id
    }

    pub async fn session(&self, id: &Txid) -> Option<Arc<Mutex<MultisigSession>>> {
        self.sessions.read().await.get(id).cloned()
    }

    async fn require(&self, id: &Txid) -> Result<Arc<Mutex<MultisigSession>>, MultisigError> {
        self.session(id)
            .await
            .ok_or_else(|| MultisigError::SessionNotFound(id.to_string()))
    }

    /// Submit one partial signature to a session
    pub async fn submit(&self, id: &Txid, partial: PartialSignature) -> Result<InputState, MultisigError> {
        let session = self.require(id).await?;
        let mut session = session.lock().await;
        session.add_signature(partial)
    }

    /// Submit signatures in text form, stopping at the first rejection
    pub async fn submit_text(&self, id: &Txid, lines: &[&str]) -> Result<usize, MultisigError> {
        let session = self.require(id).await?;
        let mut session = session.lock().await;
        let mut accepted = 0;
        for line in lines.iter().filter(|l| !l.trim().is_empty()) {
            session.add_signature(line.parse()?)?;
            accepted += 1;
        }
        Ok(accepted)
    }

    /// Assemble the redeemable transaction for a ready session
    pub async fn finalize(&self, id: &Txid) -> Result<Transaction, MultisigError> {
        let session = self.require(id).await?;
        let session = session.lock().await;
        session.finalize()
    }

    pub async fn mark_broadcast(&self, id: &Txid, txid: Txid) -> Result<(), MultisigError> {
        let session = self.require(id).await?;
        session.lock().await.mark_broadcast(txid);
        Ok(())
    }

    /// Drop a session and return its final state
    pub async fn close(&self, id: &Txid) -> Option<MultisigSession> {
        let session = self.sessions.write().await.remove(id)?;
        let session = session.lock().await;
        Some(session.clone())
    }

    pub async fn summaries(&self) -> Vec<SessionSummary> {
        let sessions: Vec<Arc<Mutex<MultisigSession>>> =
            self.sessions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let session = session.lock().await;
            out.push(SessionSummary {
                id: session.id,
                address: session.spec.address.to_string(),
                inputs: session.input_states(),
                status: session.status.clone(),
            });
        }
        out
    }
}
