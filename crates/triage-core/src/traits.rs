//! Core trait definitions for the triage pipeline.
//!
//! These four traits are the seams the dialogue engine is wired through:
//!
//! - `CaseExtractor`:  free text to a structured case (rule layer, hybrid layer)
//! - `DecisionEngine`: structured case to an imaging recommendation
//! - `Verifier`:       safety checks on a recommendation before it is shown
//! - `AuditWriter`:    append-only record of every dialogue turn
//!
//! `TriageEngine` holds one of each behind a `Box<dyn _>`, so every piece can
//! be swapped for a test double without a live process.

use triage_contracts::{
    audit::TurnRecord,
    case::ClinicalCase,
    error::TriageResult,
    extraction::ExtractionMetadata,
    recommendation::ImagingRecommendation,
    verify::VerificationReport,
};

/// Turns one free-text message into a partial clinical case.
///
/// Implementations must never guess: a concept without evidence stays
/// unknown.  Backend trouble (for example an unavailable embedding model)
/// is reported in the metadata rather than as an `Err`; `Err` is reserved
/// for input the extractor cannot process at all.
pub trait CaseExtractor: Send + Sync {
    fn extract(&self, text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)>;
}

/// Maps a structured case to an imaging recommendation.
///
/// Implementations are trusted and deterministic: the same case always
/// yields the same rule id.  The case is read, never mutated.
pub trait DecisionEngine: Send + Sync {
    /// Evaluate the rule table and return the first match, or the profile
    /// fallback when nothing matches.
    fn decide(&self, case: &ClinicalCase) -> TriageResult<ImagingRecommendation>;

    /// The conservative profile-based recommendation.
    ///
    /// Called directly by the dialogue engine when `decide` fails or the
    /// verifier rejects its output.  `cause` is appended to the rationale.
    /// This method cannot fail.
    fn fallback(&self, case: &ClinicalCase, cause: Option<&str>) -> ImagingRecommendation;

    /// Human-readable label for an imaging id.  Defaults to the id itself.
    fn imaging_label(&self, imaging_id: &str) -> String {
        imaging_id.to_string()
    }
}

/// The recommendation verifier: the last gate before a decision is shown.
pub trait Verifier: Send + Sync {
    /// Return a report with `passed = true` if every rule passes, or the
    /// full list of failures otherwise.
    fn verify(
        &self,
        case: &ClinicalCase,
        recommendation: &ImagingRecommendation,
    ) -> TriageResult<VerificationReport>;
}

/// The audit writer: the immutable record of a conversation.
///
/// A failed write is fatal for the turn: `TriageError::AuditWriteFailed` is
/// returned to the caller and the session is left as it was before the turn.
pub trait AuditWriter: Send + Sync {
    /// Start the session's chain.  Called every time a session is created; a
    /// chain sealed by an earlier reset of the same id is archived and a new
    /// epoch begins.
    fn open(&self, session_id: &str) -> TriageResult<()>;

    /// Append one turn record to the session's chain.
    fn write(&self, record: &TurnRecord) -> TriageResult<()>;

    /// Seal the session's chain.  Called when a session is reset.
    fn finalize(&self, session_id: &str) -> TriageResult<()>;
}
