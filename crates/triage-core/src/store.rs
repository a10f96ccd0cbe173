//! Concurrent in-memory session store.
//!
//! The map itself sits behind a `RwLock`; each session sits behind its own
//! `Mutex`, held for the whole duration of one turn.  Two requests for the
//! same session therefore serialize, while different sessions proceed in
//! parallel.  Sessions live until reset or process exit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use triage_contracts::{
    case::{ClinicalCase, ClinicalField},
    error::{TriageError, TriageResult},
    extraction::WeakSignal,
    recommendation::ImagingRecommendation,
    session::{DialogueState, SessionSnapshot},
};

/// One conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub case: ClinicalCase,
    pub message_count: u32,
    /// Fields asked at least once, in asking order.
    pub asked_fields: Vec<ClinicalField>,
    pub awaiting: Option<ClinicalField>,
    pub weak_signals: Vec<WeakSignal>,
    pub state: DialogueState,
    pub last_recommendation: Option<ImagingRecommendation>,
    pub last_confidence: f32,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            case: ClinicalCase::default(),
            message_count: 0,
            asked_fields: Vec::new(),
            awaiting: None,
            weak_signals: Vec::new(),
            state: DialogueState::Collecting,
            last_recommendation: None,
            last_confidence: 0.0,
        }
    }

    /// Record `field` as asked and awaited.
    pub fn ask(&mut self, field: ClinicalField) {
        if !self.asked_fields.contains(&field) {
            self.asked_fields.push(field);
        }
        self.awaiting = Some(field);
    }

    /// Add weak signals not already surfaced in this session.
    pub fn absorb_weak_signals(&mut self, signals: Vec<WeakSignal>) {
        for signal in signals {
            if !self.weak_signals.iter().any(|s| s.kind == signal.kind) {
                self.weak_signals.push(signal);
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            created_at: self.created_at,
            case: self.case.clone(),
            message_count: self.message_count,
            asked_fields: self.asked_fields.clone(),
            awaiting: self.awaiting,
            weak_signals: self.weak_signals.clone(),
            state: self.state,
            last_recommendation: self.last_recommendation.clone(),
            last_confidence: self.last_confidence,
        }
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Lock a session, mapping poisoning into a state machine error.
pub fn lock_session(handle: &SessionHandle) -> TriageResult<MutexGuard<'_, Session>> {
    handle.lock().map_err(|e| TriageError::StateMachineError {
        reason: format!("session lock poisoned: {}", e),
    })
}

fn poisoned<E: std::fmt::Display>(e: E) -> TriageError {
    TriageError::StateMachineError {
        reason: format!("session store lock poisoned: {}", e),
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session.  With `id = None` a fresh UUID is assigned; an
    /// explicit id that already exists returns the existing session.
    pub fn create(&self, id: Option<&str>) -> TriageResult<SessionHandle> {
        let id = match id {
            Some(id) if id.trim().is_empty() => {
                return Err(TriageError::InvalidInput {
                    reason: "session id must not be blank".to_string(),
                })
            }
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let handle = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                info!(session_id = %id, "session created");
                Arc::new(Mutex::new(Session::new(id.clone())))
            })
            .clone();
        Ok(handle)
    }

    /// Look up an existing session.
    pub fn get(&self, id: &str) -> TriageResult<SessionHandle> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| TriageError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    /// Remove a session.  Returns whether it existed.
    pub fn remove(&self, id: &str) -> TriageResult<bool> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        Ok(sessions.remove(id).is_some())
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
