//! Error types for the triage pipeline.
//!
//! All fallible operations in the triage crates return `TriageResult<T>`.
//! Variants carry enough context to be rendered back to a clinician or
//! appended to a recommendation rationale.

use thiserror::Error;

/// The unified error type for the triage pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriageError {
    /// The incoming message was empty, blank or otherwise unusable.
    ///
    /// Raised before extraction runs so no case is ever built from it.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The caller referenced a session id the store does not hold.
    #[error("session '{session_id}' not found")]
    SessionNotFound { session_id: String },

    /// A prescription was requested for a session that has no clinical case yet.
    #[error("session '{session_id}' has no clinical case to prescribe from")]
    MissingClinicalCase { session_id: String },

    /// A rule in the decision table is structurally invalid.
    ///
    /// Only the offending rule fails; evaluation continues with the next one.
    #[error("rule '{rule_id}' is malformed: {reason}")]
    RuleStructure { rule_id: String, reason: String },

    /// The embedding backend could not be initialized or queried.
    #[error("extraction backend unavailable: {reason}")]
    ExtractionBackend { reason: String },

    /// The decision engine could not produce a recommendation.
    #[error("decision failed: {reason}")]
    DecisionFailed { reason: String },

    /// The verifier rejected a recommendation before it reached the clinician.
    #[error("recommendation verification failed: {reason}")]
    VerificationFailed { reason: String },

    /// The audit writer could not persist a turn record.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// The dialogue state machine reached an inconsistent state.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },

    /// A configuration table (vocabulary, rules, corpus, settings) is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the triage crates.
pub type TriageResult<T> = Result<T, TriageError>;
