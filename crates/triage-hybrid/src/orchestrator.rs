//! The two-layer extraction orchestrator.
//!
//! Always runs the rule layer first.  When the rule output is weak (low
//! overall confidence, or too many critical fields undetected) the input is
//! compared against the annotated corpus and fields the rule layer did not
//! establish are back-filled by majority vote among the nearest neighbours.
//! A failing embedding backend never fails the request: the rule output is
//! returned with `EmbeddingStatus::Unavailable`.

use std::sync::{Arc, OnceLock};

use serde::Deserialize;
use tracing::{debug, info, warn};

use triage_contracts::{
    case::{ClinicalCase, ClinicalField, FindingValue},
    detection::DetectionSource,
    error::{TriageError, TriageResult},
    extraction::{
        EmbeddingStatus, EnrichedField, Evidence, ExtractionMetadata, ExtractionMethod, Neighbour,
        WeakSignal,
    },
};
use triage_core::traits::CaseExtractor;

use crate::{
    corpus::Corpus,
    embedding::{cosine_similarity, preprocess_for_embedding, EmbeddingModel},
};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Tuning for the similarity fallback.  Loaded from the `[hybrid]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HybridConfig {
    /// Trigger when the rule layer's overall confidence is below this.
    pub confidence_threshold: f32,
    pub critical_fields: Vec<ClinicalField>,
    /// Trigger when at least this many critical fields are undetected.
    pub min_missing_critical: usize,
    pub top_k: usize,
    /// Neighbours below this similarity do not vote.
    pub similarity_floor: f32,
    /// Minimum number of agreeing neighbours to back-fill a field.
    pub min_support: usize,
    /// Minimum vote share of the winning value.
    pub majority: f32,
    pub weak_signal_floor: f32,
    /// Fields the fallback may fill.
    pub enrichable: Vec<ClinicalField>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            critical_fields: vec![
                ClinicalField::Onset,
                ClinicalField::Fever,
                ClinicalField::MeningealSigns,
            ],
            min_missing_critical: 2,
            top_k: 5,
            similarity_floor: 0.6,
            min_support: 2,
            majority: 0.5,
            weak_signal_floor: 0.65,
            enrichable: vec![
                ClinicalField::Onset,
                ClinicalField::Fever,
                ClinicalField::MeningealSigns,
                ClinicalField::NeuroDeficit,
                ClinicalField::Seizure,
                ClinicalField::RaisedIcp,
                ClinicalField::Trauma,
                ClinicalField::PregnancyPostpartum,
                ClinicalField::Immunosuppression,
                ClinicalField::RecentPatternChange,
                ClinicalField::Phenotype,
            ],
        }
    }
}

impl HybridConfig {
    pub fn validate(&self) -> TriageResult<()> {
        let in_unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(TriageError::ConfigError {
                    reason: format!("hybrid.{name} must lie in [0, 1], got {v}"),
                })
            }
        };
        in_unit("confidence_threshold", self.confidence_threshold)?;
        in_unit("similarity_floor", self.similarity_floor)?;
        in_unit("majority", self.majority)?;
        in_unit("weak_signal_floor", self.weak_signal_floor)?;
        if self.top_k == 0 || self.min_support == 0 {
            return Err(TriageError::ConfigError {
                reason: "hybrid.top_k and hybrid.min_support must be positive".to_string(),
            });
        }
        Ok(())
    }
}

// ── Embedding backend ─────────────────────────────────────────────────────────

#[derive(Debug)]
struct CorpusIndex {
    vectors: Vec<Vec<f32>>,
}

/// The process-wide similarity index.
///
/// Corpus vectors are computed at most once, on first use or on an explicit
/// `warm_up`, and are read-only afterwards.  A failed build is remembered:
/// every later query reports the same reason without retrying.
pub struct EmbeddingBackend {
    model: Arc<dyn EmbeddingModel>,
    corpus: Corpus,
    index: OnceLock<Result<CorpusIndex, String>>,
}

impl std::fmt::Debug for EmbeddingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingBackend")
            .field("dimension", &self.model.dimension())
            .field("corpus_size", &self.corpus.len())
            .field("initialized", &self.index.get().is_some())
            .finish()
    }
}

impl EmbeddingBackend {
    pub fn new(model: Arc<dyn EmbeddingModel>, corpus: Corpus) -> Self {
        Self {
            model,
            corpus,
            index: OnceLock::new(),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Build the index now instead of on the first low-confidence message.
    pub fn warm_up(&self) -> TriageResult<()> {
        self.index().map(|_| ())
    }

    fn index(&self) -> TriageResult<&CorpusIndex> {
        let built = self.index.get_or_init(|| {
            let result = self.build();
            match &result {
                Ok(index) => info!(examples = index.vectors.len(), "embedding index built"),
                Err(reason) => warn!(%reason, "embedding index unavailable"),
            }
            result
        });
        built.as_ref().map_err(|reason| TriageError::ExtractionBackend {
            reason: reason.clone(),
        })
    }

    fn build(&self) -> Result<CorpusIndex, String> {
        if self.corpus.is_empty() {
            return Err("corpus is empty".to_string());
        }
        let texts: Vec<String> = self
            .corpus
            .examples
            .iter()
            .map(|ex| preprocess_for_embedding(&ex.text))
            .collect();
        let vectors = self.model.embed_batch(&texts).map_err(backend_reason)?;
        if vectors.len() != texts.len() {
            return Err(format!(
                "model returned {} vectors for {} examples",
                vectors.len(),
                texts.len()
            ));
        }
        let dim = self.model.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(format!("model returned a {}-dim vector, expected {dim}", bad.len()));
        }
        Ok(CorpusIndex { vectors })
    }

    /// The `k` corpus examples most similar to `text`, best first.
    pub fn nearest(&self, text: &str, k: usize) -> TriageResult<Vec<(usize, f32)>> {
        let index = self.index()?;
        let query = self.model.embed(&preprocess_for_embedding(text))?;
        if query.len() != self.model.dimension() {
            return Err(TriageError::ExtractionBackend {
                reason: format!("query vector has {} dims", query.len()),
            });
        }
        let mut scored: Vec<(usize, f32)> = index
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(&query, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}

fn backend_reason(e: TriageError) -> String {
    match e {
        TriageError::ExtractionBackend { reason } => reason,
        other => other.to_string(),
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

/// Rule layer plus similarity fallback.
pub struct HybridExtractor {
    rules: Box<dyn CaseExtractor>,
    backend: Arc<EmbeddingBackend>,
    config: HybridConfig,
}

impl HybridExtractor {
    pub fn new(
        rules: Box<dyn CaseExtractor>,
        backend: Arc<EmbeddingBackend>,
        config: HybridConfig,
    ) -> Self {
        Self {
            rules,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &HybridConfig {
        &self.config
    }

    /// Whether the rule output is weak enough to consult the corpus.
    pub fn should_enrich(&self, metadata: &ExtractionMetadata) -> bool {
        let missing = self
            .config
            .critical_fields
            .iter()
            .filter(|f| !metadata.is_detected(**f))
            .count();
        metadata.overall_confidence < self.config.confidence_threshold
            || missing >= self.config.min_missing_critical
    }

    fn eligible(&self, field: ClinicalField, case: &ClinicalCase, metadata: &ExtractionMetadata) -> bool {
        if !case.is_known(field) {
            return true;
        }
        metadata
            .confidence
            .get(&field)
            .map_or(true, |c| *c < self.config.confidence_threshold)
    }

    fn enrich(
        &self,
        text: &str,
        case: &mut ClinicalCase,
        metadata: &mut ExtractionMetadata,
    ) -> TriageResult<()> {
        let neighbours = self.backend.nearest(text, self.config.top_k)?;
        let examples = &self.backend.corpus().examples;

        // ── Field votes ──────────────────────────────────────────────────────
        for field in &self.config.enrichable {
            if !self.eligible(*field, case, metadata) {
                continue;
            }
            let mut groups: Vec<(FindingValue, Vec<Neighbour>)> = Vec::new();
            for (i, similarity) in &neighbours {
                if *similarity < self.config.similarity_floor {
                    continue;
                }
                let Some(value) = examples[*i].labels.get(field) else {
                    continue;
                };
                let voter = Neighbour {
                    text: examples[*i].text.clone(),
                    similarity: *similarity,
                };
                match groups.iter_mut().find(|(v, _)| v == value) {
                    Some((_, voters)) => voters.push(voter),
                    None => groups.push((*value, vec![voter])),
                }
            }

            let total: usize = groups.iter().map(|(_, v)| v.len()).sum();
            let Some(best) = groups.iter().map(|(_, v)| v.len()).max() else {
                continue;
            };
            let mut winners = groups.into_iter().filter(|(_, v)| v.len() == best);
            let (Some((value, supporting)), None) = (winners.next(), winners.next()) else {
                debug!(field = %field, "neighbour vote tied; field left as is");
                continue;
            };
            let share = best as f32 / total as f32;
            if best < self.config.min_support || share < self.config.majority {
                continue;
            }
            if !case.apply(*field, value) {
                continue;
            }

            let mean_similarity =
                supporting.iter().map(|n| n.similarity).sum::<f32>() / supporting.len() as f32;
            metadata.record(
                *field,
                (share * mean_similarity).clamp(0.0, 1.0),
                Evidence {
                    matched: supporting[0].text.clone(),
                    canonical: value.to_string(),
                    source: DetectionSource::Embedding,
                },
            );
            debug!(field = %field, %value, vote_share = share, "field back-filled from corpus");
            metadata.enriched_fields.push(EnrichedField {
                field: *field,
                value,
                vote_share: share,
                supporting,
            });
        }

        // ── Weak signals ─────────────────────────────────────────────────────
        for (i, similarity) in &neighbours {
            if *similarity < self.config.weak_signal_floor {
                continue;
            }
            let Some(label) = &examples[*i].weak_signal else {
                continue;
            };
            if metadata.weak_signals.iter().any(|w| w.kind == label.kind) {
                continue;
            }
            metadata.weak_signals.push(WeakSignal {
                kind: label.kind.clone(),
                description: label.description.clone(),
                similarity: *similarity,
                matched_text: examples[*i].text.clone(),
                imaging: label.imaging.clone(),
                note: label.note.clone(),
            });
        }
        Ok(())
    }
}

impl CaseExtractor for HybridExtractor {
    fn extract(&self, text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)> {
        let (mut case, mut metadata) = self.rules.extract(text)?;
        if !self.should_enrich(&metadata) {
            return Ok((case, metadata));
        }

        let before = case.clone();
        let before_meta = metadata.clone();
        match self.enrich(text, &mut case, &mut metadata) {
            Ok(()) => {
                case = case.normalized();
                metadata.method = ExtractionMethod::Hybrid;
                metadata.embedding = EmbeddingStatus::Applied;
                metadata.refresh_overall();
                Ok((case, metadata))
            }
            Err(e) => {
                warn!(error = %e, "embedding fallback unavailable; using rule output");
                let mut metadata = before_meta;
                metadata.embedding = EmbeddingStatus::Unavailable {
                    reason: backend_reason(e),
                };
                Ok((before, metadata))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use triage_contracts::case::Onset;

    use super::*;

    // ── Test doubles ─────────────────────────────────────────────────────────

    /// Embeds by keyword: each axis is one keyword's presence.
    struct KeywordEmbedder {
        axes: Vec<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl KeywordEmbedder {
        fn new(axes: Vec<&'static str>) -> Self {
            Self {
                axes,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl EmbeddingModel for KeywordEmbedder {
        fn dimension(&self) -> usize {
            self.axes.len()
        }

        fn embed(&self, text: &str) -> TriageResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .axes
                .iter()
                .map(|a| if text.contains(a) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    struct BrokenEmbedder;

    impl EmbeddingModel for BrokenEmbedder {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> TriageResult<Vec<f32>> {
            Err(TriageError::ExtractionBackend {
                reason: "model weights missing".to_string(),
            })
        }
    }

    /// Rule layer stand-in returning a fixed extraction.
    struct FixedRules(ClinicalCase, ExtractionMetadata);

    impl CaseExtractor for FixedRules {
        fn extract(&self, _text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)> {
            Ok((self.0.clone(), self.1.clone()))
        }
    }

    const CORPUS: &str = r#"
[[examples]]
text = "stiff neck burning"
labels = { meningeal_signs = true, fever = true }

[[examples]]
text = "stiff neck hot"
labels = { meningeal_signs = true, fever = true }

[[examples]]
text = "stiff neck"
labels = { meningeal_signs = true }

[[examples]]
text = "bolt"
labels = { onset = "sudden-maximal" }

[[examples]]
text = "cheek chewing"
[examples.weak_signal]
kind = "neuralgia"
description = "pattern suggestive of trigeminal neuralgia"
imaging = "mri_brain"
"#;

    fn axes() -> Vec<&'static str> {
        vec!["stiff", "neck", "burning", "hot", "bolt", "cheek", "chewing"]
    }

    fn hybrid_with(
        model: Arc<dyn EmbeddingModel>,
        case: ClinicalCase,
        metadata: ExtractionMetadata,
    ) -> HybridExtractor {
        let backend = Arc::new(EmbeddingBackend::new(
            model,
            Corpus::from_toml_str(CORPUS).unwrap(),
        ));
        HybridExtractor::new(Box::new(FixedRules(case, metadata)), backend, HybridConfig::default())
    }

    fn confident(field: ClinicalField) -> ExtractionMetadata {
        let mut meta = ExtractionMetadata::default();
        for f in [ClinicalField::Onset, ClinicalField::Fever, ClinicalField::MeningealSigns] {
            if f != field {
                continue;
            }
            meta.record(
                f,
                0.95,
                Evidence {
                    matched: "x".into(),
                    canonical: "x".into(),
                    source: DetectionSource::Canonical,
                },
            );
        }
        meta.refresh_overall();
        meta
    }

    // ── Triggers ─────────────────────────────────────────────────────────────

    #[test]
    fn confident_rule_output_skips_the_corpus() {
        let mut meta = ExtractionMetadata::default();
        for f in [ClinicalField::Onset, ClinicalField::Fever, ClinicalField::MeningealSigns] {
            meta.record(
                f,
                0.95,
                Evidence {
                    matched: "x".into(),
                    canonical: "x".into(),
                    source: DetectionSource::Canonical,
                },
            );
        }
        meta.refresh_overall();
        let model = Arc::new(KeywordEmbedder::new(axes()));
        let calls = model.calls.clone();
        let hybrid = hybrid_with(model, ClinicalCase::default(), meta);

        let (_, out) = hybrid.extract("stiff neck").unwrap();
        assert_eq!(out.method, ExtractionMethod::RuleBased);
        assert_eq!(out.embedding, EmbeddingStatus::NotTriggered);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "index must not be built");
    }

    #[test]
    fn missing_critical_fields_trigger_even_when_confident() {
        let hybrid = hybrid_with(
            Arc::new(KeywordEmbedder::new(axes())),
            ClinicalCase::default(),
            confident(ClinicalField::Onset),
        );
        let meta = confident(ClinicalField::Onset);
        assert!(meta.overall_confidence >= 0.7);
        assert!(hybrid.should_enrich(&meta));
    }

    // ── Enrichment ───────────────────────────────────────────────────────────

    #[test]
    fn majority_back_fills_with_evidence() {
        let hybrid = hybrid_with(
            Arc::new(KeywordEmbedder::new(axes())),
            ClinicalCase::default(),
            ExtractionMetadata::default(),
        );
        let (case, meta) = hybrid.extract("stiff neck burning").unwrap();

        assert_eq!(case.meningeal_signs, Some(true));
        assert_eq!(case.fever, Some(true));
        assert_eq!(meta.method, ExtractionMethod::Hybrid);
        assert_eq!(meta.embedding, EmbeddingStatus::Applied);
        assert_eq!(meta.trace[&ClinicalField::MeningealSigns].source, DetectionSource::Embedding);

        let meningeal = meta
            .enriched_fields
            .iter()
            .find(|e| e.field == ClinicalField::MeningealSigns)
            .unwrap();
        assert_eq!(meningeal.supporting.len(), 3);
        assert!((meningeal.vote_share - 1.0).abs() < 1e-6);
        assert!(meta.is_detected(ClinicalField::Fever));
    }

    #[test]
    fn single_neighbour_is_not_enough_support() {
        let hybrid = hybrid_with(
            Arc::new(KeywordEmbedder::new(axes())),
            ClinicalCase::default(),
            ExtractionMetadata::default(),
        );
        let (case, meta) = hybrid.extract("bolt").unwrap();
        assert_eq!(case.onset, Onset::Unknown);
        assert!(meta.enriched_fields.is_empty());
        assert_eq!(meta.embedding, EmbeddingStatus::Applied);
    }

    #[test]
    fn confidently_detected_fields_are_never_overwritten() {
        let case = ClinicalCase {
            meningeal_signs: Some(false),
            ..Default::default()
        };
        let mut meta = ExtractionMetadata::default();
        meta.record(
            ClinicalField::MeningealSigns,
            0.95,
            Evidence {
                matched: "supple neck".into(),
                canonical: "false".into(),
                source: DetectionSource::Negation,
            },
        );
        meta.refresh_overall();
        let hybrid = hybrid_with(Arc::new(KeywordEmbedder::new(axes())), case, meta);

        let (case, meta) = hybrid.extract("stiff neck burning").unwrap();
        assert_eq!(case.meningeal_signs, Some(false));
        assert_eq!(meta.trace[&ClinicalField::MeningealSigns].source, DetectionSource::Negation);
        assert_eq!(case.fever, Some(true));
    }

    #[test]
    fn weak_signals_are_surfaced_once_per_kind() {
        let hybrid = hybrid_with(
            Arc::new(KeywordEmbedder::new(axes())),
            ClinicalCase::default(),
            ExtractionMetadata::default(),
        );
        let (_, meta) = hybrid.extract("pain in the cheek when chewing").unwrap();
        match meta.weak_signals.as_slice() {
            [signal] => {
                assert_eq!(signal.kind, "neuralgia");
                assert_eq!(signal.imaging.as_deref(), Some("mri_brain"));
                assert!(signal.similarity >= 0.65);
            }
            other => panic!("expected one weak signal, got {:?}", other),
        }
    }

    // ── Degradation ──────────────────────────────────────────────────────────

    #[test]
    fn broken_backend_degrades_to_rule_output() {
        let rule_case = ClinicalCase {
            fever: Some(true),
            ..Default::default()
        };
        let hybrid = hybrid_with(Arc::new(BrokenEmbedder), rule_case.clone(), ExtractionMetadata::default());

        let (case, meta) = hybrid.extract("stiff neck").unwrap();
        assert_eq!(case, rule_case);
        assert_eq!(meta.method, ExtractionMethod::RuleBased);
        match &meta.embedding {
            EmbeddingStatus::Unavailable { reason } => assert!(reason.contains("model weights missing")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[test]
    fn index_is_built_once_and_failures_are_remembered() {
        let model = Arc::new(KeywordEmbedder::new(axes()));
        let calls = model.calls.clone();
        let backend = EmbeddingBackend::new(model, Corpus::from_toml_str(CORPUS).unwrap());
        backend.warm_up().unwrap();
        let after_build = calls.load(Ordering::SeqCst);
        assert_eq!(after_build, 5);
        backend.nearest("stiff", 2).unwrap();
        backend.nearest("neck", 2).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), after_build + 2);

        let empty = EmbeddingBackend::new(Arc::new(KeywordEmbedder::new(axes())), Corpus::default());
        for _ in 0..2 {
            match empty.warm_up() {
                Err(TriageError::ExtractionBackend { reason }) => assert_eq!(reason, "corpus is empty"),
                other => panic!("expected ExtractionBackend, got {:?}", other),
            }
        }
    }

    #[test]
    fn nearest_orders_by_similarity() {
        let backend = EmbeddingBackend::new(
            Arc::new(KeywordEmbedder::new(axes())),
            Corpus::from_toml_str(CORPUS).unwrap(),
        );
        let top = backend.nearest("stiff neck", 3).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].0, 2);
        assert!(top[0].1 >= top[1].1 && top[1].1 >= top[2].1);
    }

    #[test]
    fn config_validation_rejects_out_of_range_values() {
        assert!(HybridConfig::default().validate().is_ok());
        let bad = HybridConfig {
            majority: 1.5,
            ..Default::default()
        };
        match bad.validate() {
            Err(TriageError::ConfigError { reason }) => assert!(reason.contains("majority")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn config_parses_from_partial_toml() {
        let cfg: HybridConfig = toml::from_str(
            "top_k = 3\ncritical_fields = [\"onset\", \"neuro_deficit\"]",
        )
        .unwrap();
        assert_eq!(cfg.top_k, 3);
        assert_eq!(cfg.critical_fields, vec![ClinicalField::Onset, ClinicalField::NeuroDeficit]);
        assert_eq!(cfg.min_support, 2);
    }
}
