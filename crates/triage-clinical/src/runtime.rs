//! Default wiring of the triage engine.
//!
//! Pipeline assembled here:
//!
//!   RuleExtractor → HybridExtractor (hashing or ONNX embedder + corpus)
//!     → TomlDecisionEngine → RecommendationVerifier → InMemoryAuditWriter
//!     → TriageEngine
//!
//! The runtime keeps its own handles on the extractor, the decision engine
//! and the audit writer, so callers can inspect them after the dialogue
//! engine has taken ownership of its boxed collaborators.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use triage_audit::InMemoryAuditWriter;
use triage_contracts::{
    case::ClinicalCase,
    error::TriageResult,
    extraction::ExtractionMetadata,
    recommendation::ImagingRecommendation,
};
use triage_core::{
    traits::{CaseExtractor, DecisionEngine},
    TriageEngine,
};
use triage_hybrid::{
    Corpus, EmbeddingBackend, EmbeddingModel, HashingEmbedder, HybridConfig, HybridExtractor,
};
use triage_nlu::RuleExtractor;
use triage_rules::{ImagingModality, TomlDecisionEngine};
use triage_verify::{CustomRuleFn, RecommendationVerifier};

use crate::settings::{
    read, EmbeddingSettings, TriageSettings, CORPUS_TOML, RULES_TOML, VOCABULARY_TOML,
};

/// Verifier rule: a pregnant or postpartum patient is never sent to an
/// ionizing study that has a non-ionizing equivalent in the catalogue.
pub const PREGNANCY_AVOIDS_IONIZING: &str = "pregnancy-avoids-ionizing";

// ── Shared handles ────────────────────────────────────────────────────────────

/// Thin newtype letting an `Arc<T>` stand in as a boxed trait object while
/// the runtime keeps an inspectable handle.
struct Shared<T: ?Sized>(Arc<T>);

impl<T: CaseExtractor + ?Sized> CaseExtractor for Shared<T> {
    fn extract(&self, text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)> {
        self.0.extract(text)
    }
}

impl<T: DecisionEngine + ?Sized> DecisionEngine for Shared<T> {
    fn decide(&self, case: &ClinicalCase) -> TriageResult<ImagingRecommendation> {
        self.0.decide(case)
    }
    fn fallback(&self, case: &ClinicalCase, cause: Option<&str>) -> ImagingRecommendation {
        self.0.fallback(case, cause)
    }
    fn imaging_label(&self, imaging_id: &str) -> String {
        self.0.imaging_label(imaging_id)
    }
}

// ── Clinical tables ───────────────────────────────────────────────────────────

/// The raw clinical tables and settings a runtime is built from.
#[derive(Debug, Clone)]
pub struct ClinicalConfig {
    pub vocabulary: String,
    pub rules: String,
    pub corpus: String,
    pub settings: TriageSettings,
}

impl ClinicalConfig {
    /// The tables compiled into the crate.
    pub fn shipped() -> TriageResult<Self> {
        Ok(Self {
            vocabulary: VOCABULARY_TOML.to_string(),
            rules: RULES_TOML.to_string(),
            corpus: CORPUS_TOML.to_string(),
            settings: TriageSettings::shipped()?,
        })
    }

    /// Load `vocabulary.toml`, `rules.toml`, `corpus.toml` and `triage.toml`
    /// from one directory.
    pub fn from_dir(dir: &Path) -> TriageResult<Self> {
        Ok(Self {
            vocabulary: read(&dir.join("vocabulary.toml"), "vocabulary")?,
            rules: read(&dir.join("rules.toml"), "rule")?,
            corpus: read(&dir.join("corpus.toml"), "corpus")?,
            settings: TriageSettings::from_file(&dir.join("triage.toml"))?,
        })
    }
}

// ── Component builders ────────────────────────────────────────────────────────

/// The sentence encoder named by the settings.
///
/// A model that fails to load is logged and replaced by the hashing
/// encoder, so a missing model never stops the engine.
pub fn embedder(settings: &EmbeddingSettings) -> Arc<dyn EmbeddingModel> {
    let Some(dir) = settings.model_dir.as_deref() else {
        return Arc::new(HashingEmbedder::default());
    };

    #[cfg(feature = "onnx")]
    {
        match triage_hybrid::OnnxEmbedder::load(dir) {
            Ok(model) => return Arc::new(model),
            Err(e) => warn!(error = %e, "ONNX embedder unavailable; using hashing encoder"),
        }
    }
    #[cfg(not(feature = "onnx"))]
    {
        warn!(
            model_dir = %dir.display(),
            "built without the onnx feature; using hashing encoder"
        );
    }

    Arc::new(HashingEmbedder::default())
}

/// The hybrid extractor over `model`.
///
/// The corpus index is built eagerly; a failed build is logged and the
/// extractor keeps serving rule-layer output.
pub fn hybrid_extractor(
    rules: RuleExtractor,
    model: Arc<dyn EmbeddingModel>,
    corpus: Corpus,
    config: HybridConfig,
) -> HybridExtractor {
    let backend = Arc::new(EmbeddingBackend::new(model, corpus));
    if let Err(e) = backend.warm_up() {
        warn!(error = %e, "similarity index unavailable; rule layer only");
    }
    HybridExtractor::new(Box::new(rules), backend, config)
}

/// The `pregnancy-avoids-ionizing` check, closed over the catalogue.
pub fn pregnancy_rule(catalogue: &[ImagingModality]) -> CustomRuleFn {
    let replaceable: Vec<String> = catalogue
        .iter()
        .filter(|m| m.ionizing && m.non_ionizing_equivalent.is_some())
        .map(|m| m.id.clone())
        .collect();

    Box::new(move |case: &ClinicalCase, recommendation: &ImagingRecommendation| {
        if case.pregnancy_postpartum != Some(true) {
            return None;
        }
        let offending: Vec<&str> = recommendation
            .imaging
            .iter()
            .filter(|id| replaceable.contains(id))
            .map(String::as_str)
            .collect();
        (!offending.is_empty()).then(|| {
            format!(
                "pregnant or postpartum patient sent to ionizing {} despite a non-ionizing equivalent",
                offending.join(", ")
            )
        })
    })
}

/// The verifier with every clinical custom rule registered.
pub fn clinical_verifier(catalogue: &[ImagingModality]) -> RecommendationVerifier {
    let mut verifier = RecommendationVerifier::new();
    verifier.register_rule(PREGNANCY_AVOIDS_IONIZING, pregnancy_rule(catalogue));
    verifier
}

// ── Runtime ───────────────────────────────────────────────────────────────────

/// A fully wired triage engine plus inspectable handles on its parts.
pub struct ClinicalRuntime {
    engine: TriageEngine,
    extractor: Arc<HybridExtractor>,
    decision: Arc<TomlDecisionEngine>,
    audit: InMemoryAuditWriter,
}

impl ClinicalRuntime {
    /// Compile every table and wire the engine.
    ///
    /// Returns `TriageError::ConfigError` for any malformed table.  Rules with
    /// structural errors do not stop the build; they are logged and skipped
    /// during evaluation.
    pub fn build(config: &ClinicalConfig) -> TriageResult<Self> {
        let rules = RuleExtractor::from_toml_str(&config.vocabulary)?;
        let concepts = rules.vocabulary().concepts.len();
        let corpus = Corpus::from_toml_str(&config.corpus)?;
        let examples = corpus.len();
        let model = embedder(&config.settings.embedding);
        let extractor = Arc::new(hybrid_extractor(
            rules,
            model,
            corpus,
            config.settings.hybrid.clone(),
        ));

        let decision = Arc::new(TomlDecisionEngine::from_toml_str(&config.rules)?);
        for error in decision.validate() {
            warn!(error = %error, "rule table entry will never match");
        }

        let verifier = clinical_verifier(decision.catalogue());
        let audit = InMemoryAuditWriter::new();

        let engine = TriageEngine::new(
            Box::new(Shared(Arc::clone(&extractor))),
            Box::new(Shared(Arc::clone(&decision))),
            Box::new(verifier),
            Box::new(audit.clone()),
            config.settings.dialogue.clone(),
        );

        info!(
            concepts,
            rules = decision.rules().len(),
            imaging = decision.catalogue().len(),
            corpus_examples = examples,
            "triage engine ready"
        );
        Ok(Self {
            engine,
            extractor,
            decision,
            audit,
        })
    }

    pub fn engine(&self) -> &TriageEngine {
        &self.engine
    }

    pub fn extractor(&self) -> &HybridExtractor {
        &self.extractor
    }

    pub fn decision(&self) -> &TomlDecisionEngine {
        &self.decision
    }

    pub fn audit(&self) -> &InMemoryAuditWriter {
        &self.audit
    }
}

/// Build the engine from the tables compiled into the crate.
pub fn build_default_engine() -> TriageResult<ClinicalRuntime> {
    ClinicalRuntime::build(&ClinicalConfig::shipped()?)
}
