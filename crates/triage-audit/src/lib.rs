//! # triage-audit
//!
//! Append-only, SHA-256 hash-chained audit trail of triage dialogues.
//!
//! ## Overview
//!
//! Every turn the dialogue engine processes is wrapped in an `AuditEvent`
//! that links to the previous event of the same session via its SHA-256
//! hash.  Tampering with any event breaks the chain and is detected by
//! `verify_chain`.  The patient's text is never stored, only its length.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use triage_audit::InMemoryAuditWriter;
//! use triage_core::traits::AuditWriter;
//!
//! let writer = InMemoryAuditWriter::new();
//! writer.write(&turn_record)?;
//! writer.finalize(&session_id)?;
//!
//! assert!(writer.verify_integrity(&session_id));
//! let log = writer.export_log(&session_id);
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{AuditEvent, AuditLog};
pub use memory::InMemoryAuditWriter;

// ── Tests ─────────────────────────────────────────────────────────────────────
