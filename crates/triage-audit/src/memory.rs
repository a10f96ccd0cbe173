//! In-memory implementation of `AuditWriter`.
//!
//! `InMemoryAuditWriter` keeps one hash chain per session id behind a
//! `Mutex`, so the dialogue engine can write from any request thread.
//! `finalize` seals a chain: later writes for that session are refused until
//! the id is opened again, which archives the sealed chain and starts a new
//! epoch from genesis.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use triage_contracts::{
    audit::TurnRecord,
    error::{TriageError, TriageResult},
};
use triage_core::traits::AuditWriter;

use crate::{
    chain::{hash_event, verify_chain},
    event::{AuditEvent, AuditLog},
};

// ── Internal mutable state ────────────────────────────────────────────────────

/// One session's chain.
pub(crate) struct SessionChain {
    pub(crate) epoch: u32,
    pub(crate) events: Vec<AuditEvent>,
    pub(crate) last_hash: String,
    pub(crate) sealed: bool,
    /// Sealed chains of earlier epochs, oldest first.
    pub(crate) archived: Vec<Vec<AuditEvent>>,
}

impl SessionChain {
    fn new() -> Self {
        Self {
            epoch: 0,
            events: Vec::new(),
            last_hash: AuditEvent::GENESIS_HASH.to_string(),
            sealed: false,
            archived: Vec::new(),
        }
    }

    /// Archive the sealed events and restart from genesis.
    fn next_epoch(&mut self) {
        self.archived.push(std::mem::take(&mut self.events));
        self.last_hash = AuditEvent::GENESIS_HASH.to_string();
        self.sealed = false;
        self.epoch += 1;
    }
}

fn terminal_hash(events: &[AuditEvent]) -> String {
    events.last().map(|e| e.this_hash.clone()).unwrap_or_default()
}

pub(crate) type Chains = BTreeMap<String, SessionChain>;

// ── Public writer ─────────────────────────────────────────────────────────────

/// An in-memory, append-only audit writer with one SHA-256 chain per session.
///
/// Cheap to clone; clones share the same chains.
#[derive(Clone, Default)]
pub struct InMemoryAuditWriter {
    pub(crate) state: Arc<Mutex<Chains>>,
}

impl InMemoryAuditWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TriageResult<MutexGuard<'_, Chains>> {
        self.state.lock().map_err(|e| TriageError::AuditWriteFailed {
            reason: format!("audit state lock poisoned: {}", e),
        })
    }

    /// Export the current epoch of one session, or `None` if the id was
    /// never opened or written.
    pub fn export_log(&self, session_id: &str) -> Option<AuditLog> {
        let chains = self.lock().ok()?;
        let chain = chains.get(session_id)?;
        Some(AuditLog {
            session_id: session_id.to_string(),
            epoch: chain.epoch,
            events: chain.events.clone(),
            sealed: chain.sealed,
            exported_at: Utc::now(),
            terminal_hash: terminal_hash(&chain.events),
        })
    }

    /// Export every epoch of one session, oldest first.  Archived epochs are
    /// always sealed.
    pub fn export_history(&self, session_id: &str) -> Vec<AuditLog> {
        let Ok(chains) = self.lock() else {
            return Vec::new();
        };
        let Some(chain) = chains.get(session_id) else {
            return Vec::new();
        };
        let exported_at = Utc::now();
        let mut logs: Vec<AuditLog> = chain
            .archived
            .iter()
            .zip(0u32..)
            .map(|(events, epoch)| AuditLog {
                session_id: session_id.to_string(),
                epoch,
                events: events.clone(),
                sealed: true,
                exported_at,
                terminal_hash: terminal_hash(events),
            })
            .collect();
        logs.push(AuditLog {
            session_id: session_id.to_string(),
            epoch: chain.epoch,
            events: chain.events.clone(),
            sealed: chain.sealed,
            exported_at,
            terminal_hash: terminal_hash(&chain.events),
        });
        logs
    }

    /// Verify that every epoch of a session's chain is untampered.
    ///
    /// An unknown session has an empty chain, which is valid.
    pub fn verify_integrity(&self, session_id: &str) -> bool {
        match self.lock() {
            Ok(chains) => chains.get(session_id).map_or(true, |chain| {
                verify_chain(&chain.events) && chain.archived.iter().all(|e| verify_chain(e))
            }),
            Err(_) => false,
        }
    }

    /// Ids of every opened or written session, in sorted order.
    pub fn session_ids(&self) -> Vec<String> {
        self.lock()
            .map(|chains| chains.keys().cloned().collect())
            .unwrap_or_default()
    }
}

// ── AuditWriter impl ──────────────────────────────────────────────────────────

impl AuditWriter for InMemoryAuditWriter {
    /// Start a chain for the id, or a new epoch if its chain was sealed.
    /// Rejoining an open chain changes nothing.
    fn open(&self, session_id: &str) -> TriageResult<()> {
        let mut chains = self.lock()?;
        let chain = chains
            .entry(session_id.to_string())
            .or_insert_with(SessionChain::new);
        if chain.sealed {
            chain.next_epoch();
            info!(session_id = %session_id, epoch = chain.epoch, "audit chain reopened");
        }
        Ok(())
    }

    /// Append one turn record to its session's chain.
    fn write(&self, record: &TurnRecord) -> TriageResult<()> {
        let mut chains = self.lock()?;
        let chain = chains
            .entry(record.session_id.clone())
            .or_insert_with(SessionChain::new);

        if chain.sealed {
            return Err(TriageError::AuditWriteFailed {
                reason: format!("audit chain for session '{}' is sealed", record.session_id),
            });
        }

        let sequence = chain.events.len() as u64;
        let prev_hash = chain.last_hash.clone();
        let this_hash = hash_event(&record.session_id, sequence, record, &prev_hash)?;

        chain.events.push(AuditEvent {
            sequence,
            session_id: record.session_id.clone(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        chain.last_hash = this_hash;

        debug!(session_id = %record.session_id, epoch = chain.epoch, sequence, "turn recorded");
        Ok(())
    }

    /// Seal the session's chain and log its terminal hash.
    fn finalize(&self, session_id: &str) -> TriageResult<()> {
        let mut chains = self.lock()?;
        let chain = chains
            .entry(session_id.to_string())
            .or_insert_with(SessionChain::new);
        chain.sealed = true;

        info!(
            session_id = %session_id,
            epoch = chain.epoch,
            event_count = chain.events.len(),
            terminal_hash = %chain.last_hash,
            "audit chain sealed"
        );
        Ok(())
    }
}
