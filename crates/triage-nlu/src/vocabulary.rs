//! Vocabulary tables for the concept detector.
//!
//! A `Vocabulary` is deserialized from TOML and compiled once: every term is
//! normalized, every entry value is typed against its field, and numeric
//! patterns are compiled to regexes.  After loading the tables are
//! immutable and safe to share across threads.
//!
//! Example in TOML:
//!
//! ```toml
//! [settings]
//! negation_prefixes = ["no ", "without "]
//! exception_markers = ["but", "however"]
//!
//! [[settings.temporal_markers]]
//! term = "yesterday"
//! priority = 1
//!
//! [[concepts]]
//! field = "fever"
//! temporal_evolution = true
//!
//! [concepts.negations]
//! terms = ["no fever", "afebrile"]
//!
//! [[concepts.entries]]
//! value = true
//! confidence = 0.90
//! canonical = ["fever", "febrile"]
//! ```

use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use triage_contracts::{
    case::{ClinicalField, FieldKind, FindingValue, LabelValue},
    error::{TriageError, TriageResult},
};

use crate::normalize::normalize;

// ── Raw TOML schema ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct RawVocabulary {
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    concepts: Vec<RawConcept>,
    #[serde(default)]
    intensity_words: std::collections::BTreeMap<String, u8>,
    #[serde(default)]
    risk_contexts: Vec<RawRiskContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawSettings {
    negation_prefixes: Vec<String>,
    exception_markers: Vec<String>,
    exception_window: Option<usize>,
    temporal_markers: Vec<TemporalMarker>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawConcept {
    field: ClinicalField,
    #[serde(default)]
    selection: Selection,
    #[serde(default)]
    temporal_evolution: bool,
    #[serde(default)]
    exclusions: Vec<String>,
    #[serde(default)]
    negations: RawNegations,
    #[serde(default)]
    entries: Vec<RawEntry>,
    numeric: Option<RawNumeric>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawNegations {
    confidence: f32,
    terms: Vec<String>,
    acronyms: Vec<String>,
}

impl Default for RawNegations {
    fn default() -> Self {
        Self {
            confidence: 0.85,
            terms: Vec::new(),
            acronyms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    value: LabelValue,
    confidence: f32,
    #[serde(default)]
    canonical: Vec<String>,
    #[serde(default)]
    synonyms: Vec<String>,
    #[serde(default)]
    acronyms: Vec<String>,
    #[serde(default)]
    medical_terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawNumeric {
    patterns: Vec<String>,
    threshold: f64,
    normal_min: f64,
    normal_max: f64,
    #[serde(default = "default_numeric_confidence")]
    confidence: f32,
    #[serde(default = "default_normal_confidence")]
    normal_confidence: f32,
}

fn default_numeric_confidence() -> f32 {
    0.95
}

fn default_normal_confidence() -> f32 {
    0.90
}

#[derive(Debug, Clone, Deserialize)]
struct RawRiskContext {
    tag: String,
    terms: Vec<String>,
}

// ── Compiled tables ──────────────────────────────────────────────────────────

/// How a concept picks among several matching entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    /// Entries are tried in order; the first one with any hit wins.
    #[default]
    FirstMatch,
    /// The entry with the most distinct term hits wins (classification concepts).
    MostHits,
}

/// A time expression and how recent it is.  Higher priority is more recent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TemporalMarker {
    pub term: String,
    pub priority: u8,
}

/// Table-wide matcher settings shared by every concept.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherSettings {
    /// Prefixes that turn an immediately following positive term into a negation.
    pub negation_prefixes: Vec<String>,
    /// Contrast words that can invalidate a preceding negation.
    pub exception_markers: Vec<String>,
    /// Lookahead, in characters, for an exception marker after a negation.
    pub exception_window: usize,
    pub temporal_markers: Vec<TemporalMarker>,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            negation_prefixes: Vec::new(),
            exception_markers: Vec::new(),
            exception_window: 100,
            temporal_markers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NegationTerms {
    pub confidence: f32,
    pub terms: Vec<String>,
    pub acronyms: Vec<String>,
}

impl NegationTerms {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.acronyms.is_empty()
    }
}

/// One value a concept can take and the terms that evidence it.
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyEntry {
    pub value: FindingValue,
    pub confidence: f32,
    pub canonical: Vec<String>,
    pub synonyms: Vec<String>,
    pub acronyms: Vec<String>,
    pub medical_terms: Vec<String>,
}

impl VocabularyEntry {
    /// The display form: first canonical term, or the value itself.
    pub fn canonical_form(&self) -> String {
        self.canonical
            .first()
            .cloned()
            .unwrap_or_else(|| self.value.to_string())
    }
}

/// Three-band numeric rule, e.g. body temperature for fever.
#[derive(Debug, Clone)]
pub struct NumericRule {
    /// Group 1 is the value; an optional group 2 holds a decimal digit
    /// written after a degree sign ("38°5").
    pub patterns: Vec<Regex>,
    /// At or above: positive.
    pub threshold: f64,
    /// Inclusive band read as an explicit negative.
    pub normal_min: f64,
    pub normal_max: f64,
    pub confidence: f32,
    pub normal_confidence: f32,
}

/// The uniform per-concept vocabulary consumed by the detector.
#[derive(Debug, Clone)]
pub struct ConceptVocabulary {
    pub field: ClinicalField,
    pub selection: Selection,
    pub temporal_evolution: bool,
    pub exclusions: Vec<String>,
    pub negations: NegationTerms,
    pub entries: Vec<VocabularyEntry>,
    pub numeric: Option<NumericRule>,
}

/// A risk-context tag and its trigger terms.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskContextTag {
    pub tag: String,
    pub terms: Vec<String>,
}

/// The complete compiled vocabulary.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub settings: MatcherSettings,
    pub concepts: Vec<ConceptVocabulary>,
    /// Qualitative intensity words and their 0-10 score.
    pub intensity_words: Vec<(String, u8)>,
    pub risk_contexts: Vec<RiskContextTag>,
}

fn normalize_all(terms: Vec<String>) -> Vec<String> {
    terms
        .into_iter()
        .map(|t| normalize(&t))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Negation prefixes keep their trailing space, which `normalize` would trim.
fn normalize_prefixes(prefixes: Vec<String>) -> Vec<String> {
    prefixes
        .into_iter()
        .map(|p| {
            let trailing = p.ends_with(' ');
            let mut n = normalize(&p);
            if trailing && !n.is_empty() {
                n.push(' ');
            }
            n
        })
        .filter(|p| !p.trim().is_empty())
        .collect()
}

fn config_error(field: ClinicalField, reason: impl std::fmt::Display) -> TriageError {
    TriageError::ConfigError {
        reason: format!("vocabulary for '{}': {}", field, reason),
    }
}

impl ConceptVocabulary {
    fn compile(raw: RawConcept) -> TriageResult<Self> {
        let field = raw.field;
        let kind = field.kind();
        if !matches!(kind, FieldKind::Flag | FieldKind::Category) {
            return Err(config_error(field, "only flag and categorical fields have vocabularies"));
        }
        if raw.entries.is_empty() {
            return Err(config_error(field, "at least one entry is required"));
        }

        let negations = NegationTerms {
            confidence: raw.negations.confidence.clamp(0.0, 1.0),
            terms: normalize_all(raw.negations.terms),
            acronyms: normalize_all(raw.negations.acronyms),
        };
        if kind != FieldKind::Flag && !negations.is_empty() {
            return Err(config_error(field, "negations are only meaningful for flag fields"));
        }

        let entries = raw
            .entries
            .into_iter()
            .map(|e| {
                Ok(VocabularyEntry {
                    value: field.typed(&e.value)?,
                    confidence: e.confidence.clamp(0.0, 1.0),
                    canonical: normalize_all(e.canonical),
                    synonyms: normalize_all(e.synonyms),
                    acronyms: normalize_all(e.acronyms),
                    medical_terms: normalize_all(e.medical_terms),
                })
            })
            .collect::<TriageResult<Vec<_>>>()?;

        let numeric = match raw.numeric {
            None => None,
            Some(_) if kind != FieldKind::Flag => {
                return Err(config_error(field, "numeric rules are only meaningful for flag fields"))
            }
            Some(n) => {
                if !(n.normal_min <= n.normal_max && n.normal_max < n.threshold) {
                    return Err(config_error(
                        field,
                        "numeric bands must satisfy normal_min <= normal_max < threshold",
                    ));
                }
                let patterns = n
                    .patterns
                    .iter()
                    .map(|p| {
                        Regex::new(p)
                            .map_err(|e| config_error(field, format!("bad numeric pattern '{}': {}", p, e)))
                    })
                    .collect::<TriageResult<Vec<_>>>()?;
                Some(NumericRule {
                    patterns,
                    threshold: n.threshold,
                    normal_min: n.normal_min,
                    normal_max: n.normal_max,
                    confidence: n.confidence.clamp(0.0, 1.0),
                    normal_confidence: n.normal_confidence.clamp(0.0, 1.0),
                })
            }
        };

        Ok(Self {
            field,
            selection: raw.selection,
            temporal_evolution: raw.temporal_evolution,
            exclusions: normalize_all(raw.exclusions),
            negations,
            entries,
            numeric,
        })
    }
}

impl Vocabulary {
    /// Parse and compile a vocabulary from TOML.
    ///
    /// Returns `TriageError::ConfigError` if the TOML is malformed, a value
    /// does not fit its field, a numeric pattern does not compile, or a
    /// field has more than one concept.
    pub fn from_toml_str(s: &str) -> TriageResult<Self> {
        let raw: RawVocabulary = toml::from_str(s).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to parse vocabulary TOML: {}", e),
        })?;

        let mut concepts: Vec<ConceptVocabulary> = Vec::with_capacity(raw.concepts.len());
        for concept in raw.concepts {
            if concepts.iter().any(|c| c.field == concept.field) {
                return Err(config_error(concept.field, "declared more than once"));
            }
            concepts.push(ConceptVocabulary::compile(concept)?);
        }

        let settings = MatcherSettings {
            negation_prefixes: normalize_prefixes(raw.settings.negation_prefixes),
            exception_markers: normalize_all(raw.settings.exception_markers),
            exception_window: raw.settings.exception_window.unwrap_or(100),
            temporal_markers: raw
                .settings
                .temporal_markers
                .into_iter()
                .map(|m| TemporalMarker {
                    term: normalize(&m.term),
                    priority: m.priority,
                })
                .collect(),
        };

        let mut intensity_words = Vec::with_capacity(raw.intensity_words.len());
        for (word, score) in raw.intensity_words {
            if score > 10 {
                return Err(TriageError::ConfigError {
                    reason: format!("intensity word '{}' scores {} (max 10)", word, score),
                });
            }
            intensity_words.push((normalize(&word), score));
        }

        let risk_contexts = raw
            .risk_contexts
            .into_iter()
            .map(|r| RiskContextTag {
                tag: r.tag,
                terms: normalize_all(r.terms),
            })
            .collect();

        Ok(Self {
            settings,
            concepts,
            intensity_words,
            risk_contexts,
        })
    }

    /// Read and compile the vocabulary file at `path`.
    pub fn from_file(path: &Path) -> TriageResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to read vocabulary file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn concept(&self, field: ClinicalField) -> Option<&ConceptVocabulary> {
        self.concepts.iter().find(|c| c.field == field)
    }
}

#[cfg(test)]
mod tests {
    use triage_contracts::case::Onset;

    use super::*;

    const MINIMAL: &str = r#"
[settings]
negation_prefixes = ["no ", "sans "]
exception_markers = ["but", "Mais"]

[[settings.temporal_markers]]
term = "Hier"
priority = 1

[intensity_words]
severe = 8

[[risk_contexts]]
tag = "anticoagulation"
terms = ["Warfarin"]

[[concepts]]
field = "fever"

[concepts.negations]
terms = ["No Fever"]

[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["Fièvre", "fever"]

[concepts.numeric]
patterns = ['(\d{2}(?:\.\d)?)°']
threshold = 38.0
normal_min = 35.0
normal_max = 37.5

[[concepts]]
field = "onset"

[[concepts.entries]]
value = "sudden-maximal"
confidence = 0.95
canonical = ["thunderclap"]
"#;

    #[test]
    fn terms_are_normalized_and_values_typed() {
        let vocab = Vocabulary::from_toml_str(MINIMAL).unwrap();

        let fever = vocab.concept(ClinicalField::Fever).unwrap();
        assert_eq!(fever.entries[0].canonical, vec!["fievre", "fever"]);
        assert_eq!(fever.entries[0].value, FindingValue::Flag(true));
        assert_eq!(fever.negations.terms, vec!["no fever"]);
        assert_eq!(fever.negations.confidence, 0.85);
        assert!(fever.numeric.is_some());

        let onset = vocab.concept(ClinicalField::Onset).unwrap();
        assert_eq!(onset.entries[0].value, FindingValue::Onset(Onset::SuddenMaximal));

        assert_eq!(vocab.settings.negation_prefixes, vec!["no ", "sans "]);
        assert_eq!(vocab.settings.exception_markers, vec!["but", "mais"]);
        assert_eq!(vocab.settings.exception_window, 100);
        assert_eq!(vocab.settings.temporal_markers[0].term, "hier");
        assert_eq!(vocab.intensity_words, vec![("severe".to_string(), 8)]);
        assert_eq!(vocab.risk_contexts[0].terms, vec!["warfarin"]);
    }

    #[test]
    fn value_of_wrong_type_is_config_error() {
        let toml = r#"
[[concepts]]
field = "onset"
[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["sudden"]
"#;
        match Vocabulary::from_toml_str(toml) {
            Err(TriageError::ConfigError { reason }) => assert!(reason.contains("onset")),
            other => panic!("expected ConfigError, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn duplicate_concept_is_rejected() {
        let toml = r#"
[[concepts]]
field = "fever"
[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["fever"]

[[concepts]]
field = "fever"
[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["febrile"]
"#;
        let err = Vocabulary::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn negations_on_category_field_are_rejected() {
        let toml = r#"
[[concepts]]
field = "phenotype"
[concepts.negations]
terms = ["not a migraine"]
[[concepts.entries]]
value = "migraine-like"
confidence = 0.8
canonical = ["migraine"]
"#;
        assert!(matches!(
            Vocabulary::from_toml_str(toml),
            Err(TriageError::ConfigError { .. })
        ));
    }

    #[test]
    fn inverted_numeric_bands_are_rejected() {
        let toml = r#"
[[concepts]]
field = "fever"
[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["fever"]
[concepts.numeric]
patterns = ['(\d{2})°']
threshold = 37.0
normal_min = 35.0
normal_max = 37.5
"#;
        assert!(Vocabulary::from_toml_str(toml).is_err());
    }

    #[test]
    fn bad_regex_is_config_error() {
        let toml = r#"
[[concepts]]
field = "fever"
[[concepts.entries]]
value = true
confidence = 0.9
canonical = ["fever"]
[concepts.numeric]
patterns = ['(\d{2']
threshold = 38.0
normal_min = 35.0
normal_max = 37.5
"#;
        let err = Vocabulary::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("bad numeric pattern"));
    }
}
