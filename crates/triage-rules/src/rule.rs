//! Decision table types and configuration schema.
//!
//! A `RuleTable` is deserialized from TOML and holds an ordered list of
//! `DecisionRule`s, the imaging catalogue the rules refer to, and the
//! thresholds used by the contextual adaptations.  Rules are evaluated in
//! declaration order; the first full match wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use triage_contracts::recommendation::{ImagingRecommendation, Urgency};

/// How a rule combines its conditions.
///
/// ```toml
/// mode = "all"   # logical AND (default)
/// mode = "any"   # logical OR
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    #[default]
    All,
    Any,
}

/// What a rule recommends when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecommendation {
    #[serde(default)]
    pub imaging: Vec<String>,
    pub urgency: Urgency,
    pub comment: String,
}

/// A single decision rule loaded from TOML.
///
/// Condition keys name a case field, optionally suffixed with `_min`,
/// `_max` or `_count_min`:
///
/// ```toml
/// [[rules]]
/// id = "AGE50_001"
/// category = "secondary-risk"
/// description = "New headache after 50"
/// conditions = { age_min = 50, profile = ["acute", "subacute"] }
/// recommendation = { imaging = ["mri-brain"], urgency = "urgent", comment = "..." }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRule {
    /// Stable identifier reported as `applied_rule_id`.
    pub id: String,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub mode: MatchMode,

    /// Raw condition values; checked against the case schema at evaluation.
    #[serde(default)]
    pub conditions: BTreeMap<String, toml::Value>,

    pub recommendation: RuleRecommendation,
}

impl DecisionRule {
    pub fn to_recommendation(&self) -> ImagingRecommendation {
        ImagingRecommendation {
            imaging: self.recommendation.imaging.clone(),
            urgency: self.recommendation.urgency,
            comment: self.recommendation.comment.clone(),
            applied_rule_id: self.id.clone(),
        }
    }
}

/// One entry of the imaging catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagingModality {
    pub id: String,
    pub label: String,
    /// `ct`, `mri`, `procedure`, ...
    pub modality: String,
    #[serde(default)]
    pub ionizing: bool,
    #[serde(default)]
    pub contrast: bool,
    /// Study to use instead when ionizing radiation must be avoided.
    #[serde(default)]
    pub non_ionizing_equivalent: Option<String>,
}

impl ImagingModality {
    pub fn is_mri(&self) -> bool {
        self.modality == "mri"
    }
}

/// Thresholds and studies used by the contextual adaptations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adaptations {
    /// Women below this age need a pregnancy test before ionizing imaging.
    pub pregnancy_test_max_age: u8,
    /// Patients above this age need a renal check before contrast.
    pub renal_check_min_age: u8,
    /// Added for pregnant or postpartum patients.
    pub venous_study: String,
}

impl Default for Adaptations {
    fn default() -> Self {
        Self {
            pregnancy_test_max_age: 50,
            renal_check_min_age: 60,
            venous_study: "mr-venography".to_string(),
        }
    }
}

/// The top-level structure deserialized from a TOML rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    /// Ordered list of rules.  First match wins.
    #[serde(default)]
    pub rules: Vec<DecisionRule>,

    #[serde(default)]
    pub imaging: Vec<ImagingModality>,

    #[serde(default)]
    pub adaptations: Adaptations,
}

impl RuleTable {
    pub fn modality(&self, id: &str) -> Option<&ImagingModality> {
        self.imaging.iter().find(|m| m.id == id)
    }
}
