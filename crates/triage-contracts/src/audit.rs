//! Per-turn audit records.
//!
//! Every processed message produces exactly one `TurnRecord`.  The audit
//! writer appends it to the session's chain; records are never modified.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    case::{ClinicalCase, ClinicalField},
    recommendation::ImagingRecommendation,
    session::TerminationReason,
};

/// What the dialogue did with one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum TurnOutcome {
    /// A follow-up question was asked.
    Question { field: ClinicalField },
    /// The dialogue terminated with a recommendation.
    Decision {
        reason: TerminationReason,
        recommendation: ImagingRecommendation,
        /// Set when the recommendation came from the fallback path.
        fallback_cause: Option<String>,
    },
}

/// An immutable record of one dialogue turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub session_id: String,
    /// 1-based message counter within the session.
    pub turn: u32,
    /// Character count of the submitted text.  The text itself is not kept.
    pub input_chars: usize,
    /// True when the message was consumed as a direct answer.
    pub interpreted_as_answer: bool,
    pub detected_fields: Vec<ClinicalField>,
    /// The accumulated case after this turn.
    pub case: ClinicalCase,
    pub outcome: TurnOutcome,
    pub timestamp: DateTime<Utc>,
}
