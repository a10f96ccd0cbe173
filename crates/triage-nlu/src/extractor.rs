//! The rule-layer case extractor.
//!
//! Runs the demographic patterns and the concept detector for every tracked
//! concept against one message, then applies the case inference rules.  No
//! field is ever set without evidence; everything else stays unknown.

use std::sync::Arc;

use tracing::debug;

use triage_contracts::{
    case::{ClinicalCase, ClinicalField, FindingValue, Onset, TemporalProfile},
    detection::DetectionSource,
    error::TriageResult,
    extraction::{Contradiction, Evidence, ExtractionMetadata, ExtractionMethod},
};
use triage_core::traits::CaseExtractor;

use crate::{
    demographics::DemographicPatterns,
    matcher::Detector,
    normalize::{find_bounded, normalize},
    vocabulary::Vocabulary,
};

pub const AGE_CONFIDENCE: f32 = 0.90;
pub const SEX_CONFIDENCE: f32 = 0.80;
pub const DURATION_CONFIDENCE: f32 = 0.90;
pub const INTENSITY_CONFIDENCE: f32 = 0.85;
pub const RISK_CONTEXT_CONFIDENCE: f32 = 0.85;

/// Deterministic vocabulary-driven extractor.
///
/// Cheap to clone; the compiled vocabulary is shared.
#[derive(Debug, Clone)]
pub struct RuleExtractor {
    vocabulary: Arc<Vocabulary>,
    detector: Detector,
    patterns: DemographicPatterns,
}

fn evidence(matched: impl Into<String>, canonical: impl Into<String>, source: DetectionSource) -> Evidence {
    Evidence {
        matched: matched.into(),
        canonical: canonical.into(),
        source,
    }
}

impl RuleExtractor {
    pub fn new(vocabulary: Arc<Vocabulary>) -> TriageResult<Self> {
        let detector = Detector::new(vocabulary.settings.clone());
        Ok(Self {
            vocabulary,
            detector,
            patterns: DemographicPatterns::new()?,
        })
    }

    pub fn from_toml_str(s: &str) -> TriageResult<Self> {
        Self::new(Arc::new(Vocabulary::from_toml_str(s)?))
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Extract a partial case from one message.  Never fails on content.
    pub fn extract_rules(&self, text: &str) -> (ClinicalCase, ExtractionMetadata) {
        let normalized = normalize(text);
        let mut case = ClinicalCase::default();
        let mut metadata = ExtractionMetadata {
            method: ExtractionMethod::RuleBased,
            ..Default::default()
        };

        // ── Demographics and numbers ─────────────────────────────────────────
        if let Some(age) = self.patterns.age(&normalized) {
            case.age = Some(age.value);
            metadata.record(
                ClinicalField::Age,
                AGE_CONFIDENCE,
                evidence(age.evidence, age.value.to_string(), DetectionSource::Pattern),
            );
        }
        if let Some(sex) = self.patterns.sex(&normalized) {
            case.sex = sex.value;
            metadata.record(
                ClinicalField::Sex,
                SEX_CONFIDENCE,
                evidence(sex.evidence, sex.value.as_str(), DetectionSource::Pattern),
            );
        }
        if let Some(duration) = self.patterns.duration_hours(&normalized) {
            case.episode_hours = Some(duration.value);
            metadata.record(
                ClinicalField::EpisodeHours,
                DURATION_CONFIDENCE,
                evidence(duration.evidence, format!("{}h", duration.value), DetectionSource::Pattern),
            );
        }
        if let Some(intensity) = self
            .patterns
            .intensity(&normalized, &self.vocabulary.intensity_words)
        {
            case.intensity = Some(intensity.value);
            metadata.record(
                ClinicalField::Intensity,
                INTENSITY_CONFIDENCE,
                evidence(intensity.evidence, format!("{}/10", intensity.value), DetectionSource::Pattern),
            );
        }

        // ── Concepts ─────────────────────────────────────────────────────────
        for concept in &self.vocabulary.concepts {
            let result = self.detector.detect_normalized(&normalized, concept);
            if let (true, Some(value)) = (result.detected, result.value) {
                if case.apply(concept.field, value) {
                    metadata.record(
                        concept.field,
                        result.confidence,
                        evidence(result.evidence, result.canonical, result.source),
                    );
                }
            }
            if self.detector.conflicting(&normalized, concept) {
                metadata
                    .contradictions
                    .push(Contradiction::Conflicting { field: concept.field });
            }
        }

        // ── Risk contexts ────────────────────────────────────────────────────
        for tag in &self.vocabulary.risk_contexts {
            let hit = tag
                .terms
                .iter()
                .find(|t| find_bounded(&normalized, t, false).is_some());
            if let Some(term) = hit {
                if !case.risk_contexts.contains(&tag.tag) {
                    case.risk_contexts.push(tag.tag.clone());
                }
                metadata.record(
                    ClinicalField::RiskContexts,
                    RISK_CONTEXT_CONFIDENCE,
                    evidence(term.clone(), tag.tag.clone(), DetectionSource::Canonical),
                );
            }
        }

        // ── Inference ────────────────────────────────────────────────────────
        if let Some((profile, confidence)) = case.inferred_profile() {
            case.profile = profile;
            let basis = match (case.onset, case.episode_hours) {
                (Onset::Unknown, Some(h)) => format!("episode of {h}h"),
                (onset, _) => format!("{onset} onset"),
            };
            metadata.record(
                ClinicalField::Profile,
                confidence,
                evidence(basis, profile.as_str(), DetectionSource::Inferred),
            );
        }
        if let Some(hours) = case.episode_hours {
            let implied = TemporalProfile::from_hours(hours);
            if case.profile != TemporalProfile::Unknown && case.profile != implied {
                metadata.contradictions.push(Contradiction::DurationProfileMismatch {
                    hours,
                    profile: case.profile.to_string(),
                });
            }
        }

        metadata.refresh_overall();
        debug!(
            fields = ?metadata.detected_fields,
            overall_confidence = metadata.overall_confidence,
            contradictions = metadata.contradictions.len(),
            "rule extraction complete"
        );
        (case, metadata)
    }

    /// Read a single field's value from text, as a corpus label would.
    pub fn detect_field(&self, text: &str, field: ClinicalField) -> Option<FindingValue> {
        let concept = self.vocabulary.concept(field)?;
        let result = self.detector.detect(text, concept);
        result.detected.then_some(result.value).flatten()
    }
}

impl CaseExtractor for RuleExtractor {
    fn extract(&self, text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)> {
        Ok(self.extract_rules(text))
    }
}
