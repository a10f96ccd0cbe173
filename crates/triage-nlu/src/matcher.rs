//! The concept detector: one generic staged matcher for every concept.
//!
//! Stages, evaluated in order, first hit wins:
//!
//! 1. Exclusion terms force an undetected result.
//! 2. Explicit negations give `false`, unless an exception marker ("but",
//!    "however") follows within the lookahead window.
//! 3. Acronyms, matched on word boundaries, at 0.95 of the entry confidence.
//! 4. Numeric patterns, read against three bands.
//! 5. Canonical terms, synonyms (0.90) and medical terms (0.98).
//!
//! A concept flagged `temporal_evolution` whose text carries a time or
//! contrast marker is rescanned for every candidate instead, and the most
//! recent one wins.

use std::collections::BTreeSet;

use triage_contracts::{
    case::FindingValue,
    detection::{DetectionResult, DetectionSource},
};

use crate::{
    normalize::{bounded_matches, find_bounded, is_word_char, normalize, window},
    vocabulary::{ConceptVocabulary, MatcherSettings, NumericRule, Selection, VocabularyEntry},
};

pub const ACRONYM_FACTOR: f32 = 0.95;
pub const SYNONYM_FACTOR: f32 = 0.90;
pub const MEDICAL_TERM_FACTOR: f32 = 0.98;

/// One possible reading of the text for a concept.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    value: FindingValue,
    confidence: f32,
    position: usize,
    evidence: String,
    canonical: String,
    source: DetectionSource,
}

impl Candidate {
    fn into_result(self) -> DetectionResult {
        DetectionResult::found(self.value, self.confidence, self.evidence, self.canonical, self.source)
    }
}

/// What a positive term turned out to be once its left context is checked.
enum TermHit {
    Positive(usize),
    Negated(usize),
}

/// Stateless detector parameterized by the table-wide settings.
#[derive(Debug, Clone)]
pub struct Detector {
    settings: MatcherSettings,
}

impl Detector {
    pub fn new(settings: MatcherSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MatcherSettings {
        &self.settings
    }

    /// Detect `concept` in raw text.
    pub fn detect(&self, text: &str, concept: &ConceptVocabulary) -> DetectionResult {
        self.detect_normalized(&normalize(text), concept)
    }

    /// Detect `concept` in text that has already been normalized.
    pub fn detect_normalized(&self, text: &str, concept: &ConceptVocabulary) -> DetectionResult {
        // ── Stage 1: exclusions ──────────────────────────────────────────────
        if let Some(term) = concept
            .exclusions
            .iter()
            .find(|t| find_bounded(text, t, false).is_some())
        {
            return DetectionResult::excluded(term);
        }

        if concept.temporal_evolution && self.has_evolution_marker(text) {
            return self
                .best_by_recency(text, self.candidates(text, concept))
                .map(Candidate::into_result)
                .unwrap_or_else(DetectionResult::not_detected);
        }

        // ── Stage 2: explicit negation ───────────────────────────────────────
        if let Some(c) = self.negation_candidates(text, concept).into_iter().find(|c| {
            !self.exception_follows(text, c.position + c.evidence.len())
        }) {
            return c.into_result();
        }

        // ── Stage 3: acronyms ────────────────────────────────────────────────
        for entry in &concept.entries {
            for acronym in &entry.acronyms {
                if let Some(pos) = find_bounded(text, acronym, true) {
                    return self
                        .positive(entry, acronym, pos, ACRONYM_FACTOR, DetectionSource::Acronym)
                        .into_result();
                }
            }
        }

        // ── Stage 4: numeric bands ───────────────────────────────────────────
        if let Some(rule) = &concept.numeric {
            if let Some(c) = numeric_candidates(text, rule, concept).into_iter().next() {
                return c.into_result();
            }
        }

        // ── Stage 5: canonical, synonym, medical term ────────────────────────
        match concept.selection {
            Selection::FirstMatch => {
                for entry in &concept.entries {
                    if let Some(result) = self.first_term_hit(text, concept, entry) {
                        return result;
                    }
                }
                DetectionResult::not_detected()
            }
            Selection::MostHits => self.most_hits(text, concept),
        }
    }

    /// Whether several candidate values coexist without a time or contrast
    /// marker that would explain the change.
    pub fn conflicting(&self, text: &str, concept: &ConceptVocabulary) -> bool {
        let text = normalize(text);
        if self.has_evolution_marker(&text) {
            return false;
        }
        if concept
            .exclusions
            .iter()
            .any(|t| find_bounded(&text, t, false).is_some())
        {
            return false;
        }
        let values: BTreeSet<String> = self
            .candidates(&text, concept)
            .into_iter()
            .map(|c| c.value.to_string())
            .collect();
        values.len() > 1
    }

    // ── Stage helpers ────────────────────────────────────────────────────────

    fn has_evolution_marker(&self, text: &str) -> bool {
        self.settings
            .temporal_markers
            .iter()
            .any(|m| find_bounded(text, &m.term, true).is_some())
            || self
                .settings
                .exception_markers
                .iter()
                .any(|m| find_bounded(text, m, true).is_some())
    }

    fn exception_follows(&self, text: &str, from: usize) -> bool {
        let lookahead = window(text, from, self.settings.exception_window);
        self.settings
            .exception_markers
            .iter()
            .any(|m| find_bounded(lookahead, m, true).is_some())
    }

    /// Start of a negation prefix ending exactly at `pos`, if any.
    fn negation_start(&self, text: &str, pos: usize) -> Option<usize> {
        let before = &text[..pos];
        self.settings
            .negation_prefixes
            .iter()
            .filter(|p| before.ends_with(p.as_str()))
            .map(|p| pos - p.len())
            .filter(|start| text[..*start].chars().next_back().map_or(true, |c| !is_word_char(c)))
            .min()
    }

    fn term_hits(&self, text: &str, term: &str) -> Vec<TermHit> {
        bounded_matches(text, term, false)
            .into_iter()
            .map(|pos| {
                if self.negation_start(text, pos).is_some() {
                    TermHit::Negated(pos)
                } else {
                    TermHit::Positive(pos)
                }
            })
            .collect()
    }

    fn positive(
        &self,
        entry: &VocabularyEntry,
        term: &str,
        position: usize,
        factor: f32,
        source: DetectionSource,
    ) -> Candidate {
        Candidate {
            value: entry.value,
            confidence: entry.confidence * factor,
            position,
            evidence: term.to_string(),
            canonical: entry.canonical_form(),
            source,
        }
    }

    fn negation(&self, concept: &ConceptVocabulary, evidence: String, position: usize) -> Candidate {
        Candidate {
            value: FindingValue::Flag(false),
            confidence: concept.negations.confidence,
            position,
            evidence,
            canonical: format!("no {}", concept.field),
            source: DetectionSource::Negation,
        }
    }

    fn negation_candidates(&self, text: &str, concept: &ConceptVocabulary) -> Vec<Candidate> {
        let mut found: Vec<Candidate> = Vec::new();
        for term in &concept.negations.terms {
            for pos in bounded_matches(text, term, false) {
                found.push(self.negation(concept, term.clone(), pos));
            }
        }
        for acronym in &concept.negations.acronyms {
            for pos in bounded_matches(text, acronym, true) {
                found.push(self.negation(concept, acronym.clone(), pos));
            }
        }
        found.sort_by_key(|c| c.position);
        found
    }

    /// A prefix-negated positive term, e.g. "no stiff neck".
    fn prefixed_negation(&self, text: &str, concept: &ConceptVocabulary, term: &str, pos: usize) -> Option<Candidate> {
        let start = self.negation_start(text, pos)?;
        Some(self.negation(concept, text[start..pos + term.len()].to_string(), start))
    }

    fn first_term_hit(
        &self,
        text: &str,
        concept: &ConceptVocabulary,
        entry: &VocabularyEntry,
    ) -> Option<DetectionResult> {
        let lists: [(&[String], f32, DetectionSource); 3] = [
            (&entry.canonical, 1.0, DetectionSource::Canonical),
            (&entry.synonyms, SYNONYM_FACTOR, DetectionSource::Synonym),
            (&entry.medical_terms, MEDICAL_TERM_FACTOR, DetectionSource::MedicalTerm),
        ];
        let is_flag = matches!(entry.value, FindingValue::Flag(_));

        for (terms, factor, source) in lists {
            for term in terms {
                for hit in self.term_hits(text, term) {
                    match hit {
                        TermHit::Positive(pos) => {
                            return Some(self.positive(entry, term, pos, factor, source).into_result())
                        }
                        TermHit::Negated(pos) if is_flag => {
                            if let Some(c) = self.prefixed_negation(text, concept, term, pos) {
                                if !self.exception_follows(text, pos + term.len()) {
                                    return Some(c.into_result());
                                }
                            }
                        }
                        TermHit::Negated(_) => {}
                    }
                }
            }
        }
        None
    }

    fn most_hits(&self, text: &str, concept: &ConceptVocabulary) -> DetectionResult {
        let mut best: Option<(usize, Candidate)> = None;
        for entry in &concept.entries {
            let mut hits = 0usize;
            let mut first: Option<Candidate> = None;
            let lists: [(&[String], f32, DetectionSource); 3] = [
                (&entry.canonical, 1.0, DetectionSource::Canonical),
                (&entry.synonyms, SYNONYM_FACTOR, DetectionSource::Synonym),
                (&entry.medical_terms, MEDICAL_TERM_FACTOR, DetectionSource::MedicalTerm),
            ];
            for (terms, factor, source) in lists {
                for term in terms {
                    let positive = self.term_hits(text, term).into_iter().find_map(|h| match h {
                        TermHit::Positive(pos) => Some(pos),
                        TermHit::Negated(_) => None,
                    });
                    if let Some(pos) = positive {
                        hits += 1;
                        if first.is_none() {
                            first = Some(self.positive(entry, term, pos, factor, source));
                        }
                    }
                }
            }
            if let Some(candidate) = first {
                if best.as_ref().map_or(true, |(n, _)| hits > *n) {
                    best = Some((hits, candidate));
                }
            }
        }
        best.map(|(_, c)| c.into_result())
            .unwrap_or_else(DetectionResult::not_detected)
    }

    /// Every reading of the text for the concept, in no particular order.
    fn candidates(&self, text: &str, concept: &ConceptVocabulary) -> Vec<Candidate> {
        let mut all = self.negation_candidates(text, concept);

        for entry in &concept.entries {
            let is_flag = matches!(entry.value, FindingValue::Flag(_));
            for acronym in &entry.acronyms {
                for pos in bounded_matches(text, acronym, true) {
                    all.push(self.positive(entry, acronym, pos, ACRONYM_FACTOR, DetectionSource::Acronym));
                }
            }
            let lists: [(&[String], f32, DetectionSource); 3] = [
                (&entry.canonical, 1.0, DetectionSource::Canonical),
                (&entry.synonyms, SYNONYM_FACTOR, DetectionSource::Synonym),
                (&entry.medical_terms, MEDICAL_TERM_FACTOR, DetectionSource::MedicalTerm),
            ];
            for (terms, factor, source) in lists {
                for term in terms {
                    for hit in self.term_hits(text, term) {
                        match hit {
                            TermHit::Positive(pos) => {
                                // Skip a positive that sits inside an explicit negation phrase.
                                let inside_negation = all.iter().any(|c| {
                                    c.source == DetectionSource::Negation
                                        && c.position <= pos
                                        && pos < c.position + c.evidence.len()
                                });
                                if !inside_negation {
                                    all.push(self.positive(entry, term, pos, factor, source));
                                }
                            }
                            TermHit::Negated(pos) if is_flag => {
                                if let Some(c) = self.prefixed_negation(text, concept, term, pos) {
                                    if !all.iter().any(|o| o.position == c.position && o.value == c.value) {
                                        all.push(c);
                                    }
                                }
                            }
                            TermHit::Negated(_) => {}
                        }
                    }
                }
            }
        }

        if let Some(rule) = &concept.numeric {
            all.extend(numeric_candidates(text, rule, concept));
        }
        all
    }

    /// Priority of the closest time marker at or before `position`.
    fn recency_at(&self, text: &str, position: usize) -> u8 {
        let mut best: Option<(usize, u8)> = None;
        for marker in &self.settings.temporal_markers {
            for pos in bounded_matches(text, &marker.term, true) {
                if pos <= position {
                    let distance = position - pos;
                    if best.map_or(true, |(d, _)| distance < d) {
                        best = Some((distance, marker.priority));
                    }
                }
            }
        }
        best.map_or(0, |(_, p)| p)
    }

    fn best_by_recency(&self, text: &str, candidates: Vec<Candidate>) -> Option<Candidate> {
        candidates
            .into_iter()
            .map(|c| (self.recency_at(text, c.position), c))
            .max_by_key(|(priority, c)| (*priority, c.position))
            .map(|(_, c)| c)
    }
}

/// Numeric readings in text order.  Values between the normal band and the
/// threshold produce no candidate.
fn numeric_candidates(text: &str, rule: &NumericRule, concept: &ConceptVocabulary) -> Vec<Candidate> {
    let canonical = concept
        .entries
        .iter()
        .find(|e| e.value == FindingValue::Flag(true))
        .map(VocabularyEntry::canonical_form)
        .unwrap_or_else(|| concept.field.to_string());

    let mut found: Vec<Candidate> = Vec::new();
    for pattern in &rule.patterns {
        for caps in pattern.captures_iter(text) {
            let (Some(whole), Some(int)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let raw = int.as_str().replace(',', ".");
            let raw = match caps.get(2) {
                Some(decimal) if !raw.contains('.') => format!("{}.{}", raw, decimal.as_str()),
                _ => raw,
            };
            let Ok(value) = raw.parse::<f64>() else {
                continue;
            };

            let reading = if value >= rule.threshold {
                Some((true, rule.confidence, canonical.clone()))
            } else if (rule.normal_min..=rule.normal_max).contains(&value) {
                Some((false, rule.normal_confidence, format!("no {}", concept.field)))
            } else {
                None
            };
            if let Some((flag, confidence, canonical)) = reading {
                if found.iter().any(|c| c.position == whole.start()) {
                    continue;
                }
                found.push(Candidate {
                    value: FindingValue::Flag(flag),
                    confidence,
                    position: whole.start(),
                    evidence: whole.as_str().to_string(),
                    canonical,
                    source: DetectionSource::Numeric,
                });
            }
        }
    }
    found.sort_by_key(|c| c.position);
    found
}

#[cfg(test)]
mod tests {
    use triage_contracts::case::{ClinicalField, Onset, Phenotype};

    use super::*;
    use crate::vocabulary::Vocabulary;

    const TABLE: &str = r#"
[settings]
negation_prefixes = ["no ", "without ", "pas de ", "sans "]
exception_markers = ["but", "however", "mais"]
exception_window = 100

[[settings.temporal_markers]]
term = "yesterday"
priority = 1

[[settings.temporal_markers]]
term = "this morning"
priority = 10

[[settings.temporal_markers]]
term = "now"
priority = 15

[[concepts]]
field = "fever"
temporal_evolution = true

[concepts.negations]
confidence = 0.85
terms = ["no fever", "afebrile", "sans fievre"]
acronyms = ["apyr"]

[[concepts.entries]]
value = true
confidence = 0.90
canonical = ["fever", "fievre", "febrile"]
synonyms = ["feverish", "hot and shivering"]
acronyms = ["feb"]

[concepts.numeric]
patterns = ['\b(?:t°?|temp(?:erature)?|fever)\s?(?:of |at |=)?(\d{2}(?:[.,]\d+)?)', '\b(\d{2})°(\d)\b', '\b(\d{2}(?:[.,]\d+)?)°c?']
threshold = 38.0
normal_min = 35.0
normal_max = 37.5

[[concepts]]
field = "raised_icp"
exclusions = ["aura"]

[[concepts.entries]]
value = true
confidence = 0.90
canonical = ["raised intracranial pressure"]
synonyms = ["projectile vomiting"]
medical_terms = ["papilledema"]
acronyms = ["ricp"]

[[concepts]]
field = "neuro_deficit"

[concepts.negations]
terms = ["no deficit", "neuro exam normal"]

[[concepts.entries]]
value = true
confidence = 0.90
canonical = ["neurological deficit"]
synonyms = ["weakness in the arm", "slurred speech"]
medical_terms = ["hemiparesis", "aphasia"]

[[concepts]]
field = "onset"

[[concepts.entries]]
value = "sudden-maximal"
confidence = 0.95
canonical = ["thunderclap", "sudden onset"]
synonyms = ["worst headache of my life", "all of a sudden"]

[[concepts.entries]]
value = "progressive"
confidence = 0.85
canonical = ["progressive", "gradually"]

[[concepts]]
field = "phenotype"
selection = "most-hits"

[[concepts.entries]]
value = "migraine-like"
confidence = 0.85
canonical = ["migraine"]
synonyms = ["throbbing", "photophobia", "nausea", "one side"]

[[concepts.entries]]
value = "tension-like"
confidence = 0.80
canonical = ["tension"]
synonyms = ["band", "pressing", "both sides"]
"#;

    fn setup() -> (Detector, Vocabulary) {
        let vocab = Vocabulary::from_toml_str(TABLE).unwrap();
        (Detector::new(vocab.settings.clone()), vocab)
    }

    fn detect(text: &str, field: ClinicalField) -> DetectionResult {
        let (detector, vocab) = setup();
        detector.detect(text, vocab.concept(field).unwrap())
    }

    // ── Absence and negation ─────────────────────────────────────────────────

    #[test]
    fn absence_of_evidence_is_not_detected() {
        let r = detect("headache since this afternoon", ClinicalField::Fever);
        assert!(!r.detected);
        assert_eq!(r.value, None);
        assert_eq!(r.source, DetectionSource::None);
    }

    #[test]
    fn explicit_negation_gives_false() {
        let r = detect("Patient afebrile, headache", ClinicalField::Fever);
        assert!(r.detected);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));
        assert_eq!(r.source, DetectionSource::Negation);
        assert!((r.confidence - 0.85).abs() < 1e-6);
    }

    #[test]
    fn negation_prefix_before_positive_term_is_a_negation() {
        let r = detect("headache without neurological deficit", ClinicalField::NeuroDeficit);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));
        assert_eq!(r.evidence, "without neurological deficit");
    }

    #[test]
    fn exception_marker_lets_positive_through() {
        let r = detect("no deficit reported initially, however slurred speech", ClinicalField::NeuroDeficit);
        assert_eq!(r.value, Some(FindingValue::Flag(true)));
        assert_eq!(r.source, DetectionSource::Synonym);
    }

    #[test]
    fn exception_beyond_window_does_not_cancel_negation() {
        let filler = "x".repeat(120);
        let text = format!("no deficit {filler} however slurred speech");
        let r = detect(&text, ClinicalField::NeuroDeficit);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));
    }

    // ── Exclusions and sources ───────────────────────────────────────────────

    #[test]
    fn exclusion_wins_over_positive_terms() {
        let r = detect("visual aura then projectile vomiting", ClinicalField::RaisedIcp);
        assert!(!r.detected);
        assert_eq!(r.source, DetectionSource::Exclusion);
        assert_eq!(r.evidence, "aura");
    }

    #[test]
    fn acronym_is_discounted_and_boundary_matched() {
        let r = detect("suspect RICP", ClinicalField::RaisedIcp);
        assert_eq!(r.source, DetectionSource::Acronym);
        assert!((r.confidence - 0.90 * ACRONYM_FACTOR).abs() < 1e-6);

        let r = detect("tricpx", ClinicalField::RaisedIcp);
        assert!(!r.detected);
    }

    #[test]
    fn synonym_and_medical_term_confidences() {
        let r = detect("projectile vomiting", ClinicalField::RaisedIcp);
        assert_eq!(r.source, DetectionSource::Synonym);
        assert!((r.confidence - 0.90 * SYNONYM_FACTOR).abs() < 1e-6);

        let r = detect("bilateral papilledema", ClinicalField::RaisedIcp);
        assert_eq!(r.source, DetectionSource::MedicalTerm);
        assert!((r.confidence - 0.90 * MEDICAL_TERM_FACTOR).abs() < 1e-6);
    }

    #[test]
    fn categorical_concept_skips_negated_terms() {
        let r = detect("no thunderclap, it came on gradually", ClinicalField::Onset);
        assert_eq!(r.value, Some(FindingValue::Onset(Onset::Progressive)));

        let r = detect("started gradually over the day", ClinicalField::Onset);
        assert_eq!(r.value, Some(FindingValue::Onset(Onset::Progressive)));
    }

    #[test]
    fn most_hits_selection_picks_dominant_phenotype() {
        let r = detect("pressing like a band on both sides, some nausea", ClinicalField::Phenotype);
        assert_eq!(r.value, Some(FindingValue::Phenotype(Phenotype::TensionLike)));

        let r = detect("throbbing on one side with photophobia", ClinicalField::Phenotype);
        assert_eq!(r.value, Some(FindingValue::Phenotype(Phenotype::MigraineLike)));
    }

    // ── Numeric bands ────────────────────────────────────────────────────────

    #[test]
    fn temperature_at_threshold_is_fever() {
        let r = detect("temperature 38.0", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(true)));
        assert_eq!(r.source, DetectionSource::Numeric);
    }

    #[test]
    fn temperature_in_normal_band_is_explicit_false() {
        let r = detect("temperature 37.5", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));
        assert!((r.confidence - 0.90).abs() < 1e-6);
    }

    #[test]
    fn temperature_between_band_and_threshold_is_not_detected() {
        let r = detect("temperature 37.8", ClinicalField::Fever);
        assert!(!r.detected);
    }

    #[test]
    fn degree_decimal_notation_is_read() {
        let r = detect("T° 38°5", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(true)));
        let r = detect("36,8°C this evening", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));
    }

    // ── Temporal evolution ───────────────────────────────────────────────────

    #[test]
    fn most_recent_reading_wins() {
        let r = detect("feverish yesterday, this morning no fever", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(false)));

        let r = detect("no fever yesterday, now 39.2°", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(true)));
        assert_eq!(r.source, DetectionSource::Numeric);
    }

    #[test]
    fn later_position_breaks_recency_ties() {
        let r = detect("afebrile but now febrile", ClinicalField::Fever);
        assert_eq!(r.value, Some(FindingValue::Flag(true)));
    }

    #[test]
    fn conflicting_readings_are_reported() {
        let (detector, vocab) = setup();
        let fever = vocab.concept(ClinicalField::Fever).unwrap();
        assert!(detector.conflicting("fever, afebrile", fever));
        assert!(!detector.conflicting("fever yesterday, afebrile now", fever));
        assert!(!detector.conflicting("fever 39", fever));
    }
}
