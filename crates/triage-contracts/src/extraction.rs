//! Metadata that accompanies every extracted case.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    case::{ClinicalField, FindingValue},
    detection::DetectionSource,
};

/// Which layers contributed to an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionMethod {
    #[default]
    RuleBased,
    Hybrid,
}

/// Whether the embedding layer ran, and how it went.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum EmbeddingStatus {
    #[default]
    NotTriggered,
    Applied,
    /// The backend failed; the output is rule-layer only.
    Unavailable { reason: String },
}

/// The winning evidence for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub matched: String,
    pub canonical: String,
    pub source: DetectionSource,
}

/// A logical inconsistency noticed during extraction.  Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Contradiction {
    /// The text carries cues for more than one value of the field.
    Conflicting { field: ClinicalField },
    /// The stated episode length disagrees with the stated profile.
    DurationProfileMismatch { hours: f64, profile: String },
}

impl std::fmt::Display for Contradiction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Contradiction::Conflicting { field } => write!(f, "{}_conflicting", field),
            Contradiction::DurationProfileMismatch { hours, profile } => {
                write!(f, "duration_profile_mismatch ({hours}h vs {profile})")
            }
        }
    }
}

/// One corpus neighbour that voted for a back-filled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub text: String,
    pub similarity: f32,
}

/// A field back-filled by the embedding layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedField {
    pub field: ClinicalField,
    pub value: FindingValue,
    /// Fraction of voting neighbours that agreed on `value`.
    pub vote_share: f32,
    pub supporting: Vec<Neighbour>,
}

/// A differential-diagnosis pattern surfaced by corpus similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakSignal {
    /// e.g. `neuralgia`, `chronic-daily-headache`.
    pub kind: String,
    pub description: String,
    pub similarity: f32,
    pub matched_text: String,
    /// Suggested imaging catalogue id, if any.
    #[serde(default)]
    pub imaging: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Everything an extraction knows about how it reached its case.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractionMetadata {
    /// Fields that received a value from this message, in detection order.
    pub detected_fields: Vec<ClinicalField>,
    pub confidence: BTreeMap<ClinicalField, f32>,
    /// Mean of `confidence`; 0 when nothing was detected.
    pub overall_confidence: f32,
    pub trace: BTreeMap<ClinicalField, Evidence>,
    pub contradictions: Vec<Contradiction>,
    pub method: ExtractionMethod,
    pub embedding: EmbeddingStatus,
    pub enriched_fields: Vec<EnrichedField>,
    pub weak_signals: Vec<WeakSignal>,
}

impl ExtractionMetadata {
    /// Record a detected field with its confidence and evidence.
    pub fn record(&mut self, field: ClinicalField, confidence: f32, evidence: Evidence) {
        if !self.detected_fields.contains(&field) {
            self.detected_fields.push(field);
        }
        self.confidence.insert(field, confidence);
        self.trace.insert(field, evidence);
    }

    pub fn is_detected(&self, field: ClinicalField) -> bool {
        self.detected_fields.contains(&field)
    }

    /// Recompute `overall_confidence` from the per-field scores.
    pub fn refresh_overall(&mut self) {
        self.overall_confidence = if self.confidence.is_empty() {
            0.0
        } else {
            self.confidence.values().sum::<f32>() / self.confidence.len() as f32
        };
    }
}
