//! Output of one concept-detector call.

use serde::{Deserialize, Serialize};

use crate::case::FindingValue;

/// Which matcher stage produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionSource {
    Canonical,
    /// Synonyms and colloquial patient phrasing.
    Synonym,
    Acronym,
    Numeric,
    Negation,
    Exclusion,
    MedicalTerm,
    /// Demographic pattern extractors (age, sex, duration, intensity).
    Pattern,
    /// Derived by the case inference rules rather than read from text.
    Inferred,
    /// Back-filled from nearest corpus neighbours.
    Embedding,
    /// No stage matched.
    None,
}

/// A typed detection with confidence and provenance.
///
/// `detected = false` means "no evidence"; the field stays unknown.  An
/// explicit negative finding is `detected = true` with `FindingValue::Flag(false)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detected: bool,
    pub value: Option<FindingValue>,
    pub confidence: f32,
    /// The matched text, as found in the normalized input.
    pub evidence: String,
    pub canonical: String,
    pub source: DetectionSource,
}

impl DetectionResult {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            value: None,
            confidence: 0.0,
            evidence: String::new(),
            canonical: String::new(),
            source: DetectionSource::None,
        }
    }

    /// An exclusion term forced the concept off.
    pub fn excluded(term: &str) -> Self {
        Self {
            detected: false,
            value: None,
            confidence: 0.0,
            evidence: term.to_string(),
            canonical: String::new(),
            source: DetectionSource::Exclusion,
        }
    }

    pub fn found(
        value: FindingValue,
        confidence: f32,
        evidence: impl Into<String>,
        canonical: impl Into<String>,
        source: DetectionSource,
    ) -> Self {
        Self {
            detected: true,
            value: Some(value),
            confidence: confidence.clamp(0.0, 1.0),
            evidence: evidence.into(),
            canonical: canonical.into(),
            source,
        }
    }
}
