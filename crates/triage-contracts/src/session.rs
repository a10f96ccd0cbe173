//! Session-level types exchanged with callers of the dialogue engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    case::{ClinicalCase, ClinicalField},
    extraction::WeakSignal,
    recommendation::ImagingRecommendation,
};

/// Why a dialogue stopped collecting information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminationReason {
    /// No critical field is missing.
    Complete,
    /// An emergency signature or a positive red flag on an aggravated chronic headache.
    EmergencyRedFlag,
    /// Chronic headache with no recent change.
    ChronicStableNoChange,
    /// Chronic headache that changed, with every red flag answered negative.
    ChronicAggravatedCleared,
    /// Critical fields remain unknown but each has already been asked once.
    QuestionsExhausted,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Complete => "complete",
            TerminationReason::EmergencyRedFlag => "emergency-red-flag",
            TerminationReason::ChronicStableNoChange => "chronic-stable-no-change",
            TerminationReason::ChronicAggravatedCleared => "chronic-aggravated-cleared",
            TerminationReason::QuestionsExhausted => "questions-exhausted",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum DialogueState {
    #[default]
    Collecting,
    Terminated(TerminationReason),
}

/// Read-only copy of a session, returned by `session_info`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub case: ClinicalCase,
    pub message_count: u32,
    pub asked_fields: Vec<ClinicalField>,
    pub awaiting: Option<ClinicalField>,
    pub weak_signals: Vec<WeakSignal>,
    pub state: DialogueState,
    pub last_recommendation: Option<ImagingRecommendation>,
    pub last_confidence: f32,
}

/// The reply to one submitted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResponse {
    pub message: String,
    pub session_id: String,
    /// The field the dialogue is now waiting on, if any.
    pub next_question: Option<ClinicalField>,
    pub case: ClinicalCase,
    pub requires_more_info: bool,
    pub dialogue_complete: bool,
    pub imaging_recommendation: Option<ImagingRecommendation>,
    pub termination: Option<TerminationReason>,
    /// Overall extraction confidence for this message.
    pub confidence: f32,
}
