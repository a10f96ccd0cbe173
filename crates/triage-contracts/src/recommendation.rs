//! Imaging recommendation produced by the decision engine.

use serde::{Deserialize, Serialize};

/// How quickly the patient must be seen.  Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Urgency {
    #[default]
    None,
    Delayed,
    Urgent,
    Immediate,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::None => "none",
            Urgency::Delayed => "delayed",
            Urgency::Urgent => "urgent",
            Urgency::Immediate => "immediate",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision engine's output.  Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingRecommendation {
    /// Imaging catalogue ids, e.g. `ct-head-non-contrast`.
    pub imaging: Vec<String>,
    pub urgency: Urgency,
    /// Rationale, including any appended contraindication or precaution notes.
    pub comment: String,
    /// The matched rule id, or a `FALLBACK_*` tag.
    pub applied_rule_id: String,
}

impl ImagingRecommendation {
    pub fn requires_imaging(&self) -> bool {
        !self.imaging.is_empty()
    }

    pub fn is_emergency(&self) -> bool {
        self.urgency == Urgency::Immediate
    }

    pub fn is_fallback(&self) -> bool {
        self.applied_rule_id.starts_with("FALLBACK_")
    }
}
