//! # triage-core
//!
//! The multi-turn dialogue runtime for headache triage.
//!
//! This crate provides:
//! - The four trait seams (`CaseExtractor`, `DecisionEngine`, `Verifier`, `AuditWriter`)
//! - The `TriageEngine` session state machine and its concurrent `SessionStore`
//! - Question ranking, answer interpretation and the termination policy
//! - Rendering of final messages and the imaging prescription
//!
//! ## Usage
//!
//! ```rust,ignore
//! use triage_core::{TriageEngine, DialogueConfig};
//!
//! let engine = TriageEngine::new(extractor, decision, verifier, audit, DialogueConfig::default());
//! let response = engine.submit_message(None, "sudden worst headache of my life")?;
//! ```

pub mod dialogue;
pub mod prescription;
pub mod questions;
pub mod render;
pub mod store;
pub mod termination;
pub mod traits;

pub use dialogue::{DialogueConfig, TriageEngine};
pub use store::{Session, SessionStore};
pub use termination::{TerminationCheck, CHRONIC_RED_FLAGS};
