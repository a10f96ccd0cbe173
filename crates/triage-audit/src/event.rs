//! Audit event and log types.
//!
//! `AuditEvent` is a single entry in a session's hash chain: it wraps a
//! `TurnRecord` with sequence numbering and the SHA-256 hashes that make
//! tampering detectable.  `AuditLog` is the exported record of one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use triage_contracts::audit::TurnRecord;

/// A single entry in the SHA-256 hash chain for one session.
///
/// Modifying any field, including those of the embedded `record`,
/// invalidates `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub session_id: String,

    pub record: TurnRecord,

    /// Hash of the previous event, or `GENESIS_HASH` for the first one.
    pub prev_hash: String,

    /// Hash over (session_id, sequence, prev_hash, canonical JSON of record).
    pub this_hash: String,
}

impl AuditEvent {
    /// The `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// The exported audit log of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub session_id: String,

    /// Incremented each time a sealed session id is opened again.
    pub epoch: u32,

    /// All events in chain order.
    pub events: Vec<AuditEvent>,

    /// True once the session was reset and its chain sealed.
    pub sealed: bool,

    pub exported_at: DateTime<Utc>,

    /// The `this_hash` of the last event.  Empty if the log is empty.
    pub terminal_hash: String,
}
