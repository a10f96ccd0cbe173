//! Recommendation verifier.
//!
//! `RecommendationVerifier` implements the `Verifier` trait from
//! `triage-core`.  Verification runs in two phases:
//!
//! 1. **Structural**: the serialized recommendation is validated against a
//!    JSON Schema document using the `jsonschema` crate.
//! 2. **Semantic**: built-in safety rules, then every registered custom
//!    rule.  All failures are collected before returning.
//!
//! Rules that need clinical tables (for example the imaging catalogue) are
//! registered by the wiring crate through `register_rule`.

use serde_json::json;
use tracing::{debug, warn};

use triage_contracts::{
    case::ClinicalCase,
    error::{TriageError, TriageResult},
    recommendation::{ImagingRecommendation, Urgency},
    verify::{VerificationFailure, VerificationReport},
};
use triage_core::traits::Verifier;

/// A caller-supplied verification function.
///
/// Returns `Some(message)` when the check fails, or `None` on success.
pub type CustomRuleFn =
    Box<dyn Fn(&ClinicalCase, &ImagingRecommendation) -> Option<String> + Send + Sync>;

pub const SCHEMA_RULE: &str = "json-schema";
pub const IMMEDIATE_REQUIRES_IMAGING: &str = "immediate-requires-imaging";
pub const RULE_ID_PRESENT: &str = "rule-id-present";
pub const EMERGENCY_NOT_DOWNGRADED: &str = "emergency-not-downgraded";

/// The JSON Schema every recommendation must satisfy.
pub fn recommendation_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "imaging": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 },
                "uniqueItems": true
            },
            "urgency": { "enum": ["none", "delayed", "urgent", "immediate"] },
            "comment": { "type": "string", "minLength": 1 },
            "applied_rule_id": { "type": "string" }
        },
        "required": ["imaging", "urgency", "comment", "applied_rule_id"]
    })
}

/// The last gate before a recommendation is shown.
pub struct RecommendationVerifier {
    schema: serde_json::Value,
    /// Named custom rules, run in registration order.
    custom_rules: Vec<(String, CustomRuleFn)>,
}

impl RecommendationVerifier {
    /// Create a verifier with the default schema and no custom rules.
    pub fn new() -> Self {
        Self::with_schema(recommendation_schema())
    }

    pub fn with_schema(schema: serde_json::Value) -> Self {
        Self {
            schema,
            custom_rules: Vec::new(),
        }
    }

    /// Register a custom rule under `name`.  Registering the same name twice
    /// replaces the previous function.
    pub fn register_rule(&mut self, name: impl Into<String>, f: CustomRuleFn) {
        let name = name.into();
        match self.custom_rules.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = f,
            None => self.custom_rules.push((name, f)),
        }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.custom_rules.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn builtin(case: &ClinicalCase, rec: &ImagingRecommendation) -> Vec<(&'static str, String)> {
        let mut failures = Vec::new();
        if rec.urgency == Urgency::Immediate && !rec.requires_imaging() {
            failures.push((
                IMMEDIATE_REQUIRES_IMAGING,
                "an immediate recommendation must name at least one study".to_string(),
            ));
        }
        if rec.applied_rule_id.trim().is_empty() {
            failures.push((RULE_ID_PRESENT, "applied rule id is empty".to_string()));
        }
        if case.emergency_signature() && rec.urgency < Urgency::Urgent {
            failures.push((
                EMERGENCY_NOT_DOWNGRADED,
                format!(
                    "case carries an emergency signature but urgency is '{}'",
                    rec.urgency
                ),
            ));
        }
        failures
    }
}

impl Default for RecommendationVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier for RecommendationVerifier {
    fn verify(
        &self,
        case: &ClinicalCase,
        recommendation: &ImagingRecommendation,
    ) -> TriageResult<VerificationReport> {
        let mut failures: Vec<VerificationFailure> = Vec::new();

        // ── Phase 1: JSON Schema structural validation ────────────────────────
        let payload =
            serde_json::to_value(recommendation).map_err(|e| TriageError::VerificationFailed {
                reason: format!("recommendation is not serializable: {e}"),
            })?;
        match jsonschema::validator_for(&self.schema) {
            Ok(validator) => {
                for error in validator.iter_errors(&payload) {
                    let message = format!(
                        "JSON Schema violation at {}: {}",
                        error.instance_path, error
                    );
                    warn!(%message, "structural validation failure");
                    failures.push(VerificationFailure {
                        rule_id: SCHEMA_RULE.to_string(),
                        message,
                    });
                }
            }
            Err(e) => {
                let message = format!("invalid JSON Schema document: {e}");
                warn!(%message, "schema compilation failure");
                failures.push(VerificationFailure {
                    rule_id: SCHEMA_RULE.to_string(),
                    message,
                });
            }
        }

        // ── Phase 2: Semantic rules ───────────────────────────────────────────
        for (rule_id, message) in Self::builtin(case, recommendation) {
            warn!(rule_id, %message, "semantic rule failed");
            failures.push(VerificationFailure {
                rule_id: rule_id.to_string(),
                message,
            });
        }
        for (name, f) in &self.custom_rules {
            debug!(rule_id = %name, "evaluating custom rule");
            if let Some(message) = f(case, recommendation) {
                warn!(rule_id = %name, %message, "semantic rule failed");
                failures.push(VerificationFailure {
                    rule_id: name.clone(),
                    message,
                });
            }
        }

        let report = VerificationReport::from_failures(failures);
        debug!(
            applied_rule_id = %recommendation.applied_rule_id,
            passed = report.passed,
            failure_count = report.failures.len(),
            "verification complete"
        );
        Ok(report)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
