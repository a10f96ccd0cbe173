//! TOML-driven decision engine implementation.
//!
//! `TomlDecisionEngine` loads a `RuleTable` from a TOML string or file and
//! implements the `DecisionEngine` trait from triage-core.
//!
//! Evaluation algorithm:
//!
//! 1. Iterate rules in declaration order.
//! 2. Check each condition against the case schema.  A structurally invalid
//!    rule fails on its own: the error is collected and the next rule is
//!    tried.
//! 3. The first rule whose conditions hold (all of them, or any of them in
//!    `any` mode) wins.
//! 4. If no rule matched, the profile fallback is used.
//! 5. Contextual adaptations are applied to whichever recommendation won.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use triage_contracts::{
    case::ClinicalCase,
    error::{TriageError, TriageResult},
    recommendation::ImagingRecommendation,
};
use triage_core::traits::DecisionEngine;

use crate::{
    adapt,
    condition::Condition,
    fallback::{profile_fallback, BASELINE_CT, BASELINE_MRI},
    rule::{DecisionRule, ImagingModality, MatchMode, RuleTable},
};

/// The result of one evaluation, with the rules that could not be evaluated.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub recommendation: ImagingRecommendation,
    /// The matched rule id; `None` when the fallback was used.
    pub matched: Option<String>,
    /// Structural errors met on the way.  Never the same as "no match".
    pub rule_errors: Vec<TriageError>,
}

/// Every rule that matches a case, for debugging a table.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub matching_rule_ids: Vec<String>,
    pub applied_rule_id: String,
    pub rule_errors: Vec<String>,
    pub recommendation: ImagingRecommendation,
}

/// A `DecisionEngine` implementation that reads rules from a TOML document.
///
/// ```rust,ignore
/// use triage_rules::TomlDecisionEngine;
///
/// let engine = TomlDecisionEngine::from_file(Path::new("config/rules.toml"))?;
/// ```
#[derive(Debug)]
pub struct TomlDecisionEngine {
    table: RuleTable,
}

impl TomlDecisionEngine {
    /// Parse `s` as TOML and build a `TomlDecisionEngine`.
    ///
    /// Returns `TriageError::ConfigError` if the TOML is malformed, a rule id
    /// is duplicated, or a recommendation names a study missing from the
    /// imaging catalogue.  Condition errors are not load errors; see
    /// `validate`.
    pub fn from_toml_str(s: &str) -> TriageResult<Self> {
        let table: RuleTable = toml::from_str(s).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to parse rule TOML: {}", e),
        })?;
        Self::check_table(&table)?;
        Ok(Self { table })
    }

    /// Read the file at `path` and parse it as a TOML rule table.
    pub fn from_file(path: &Path) -> TriageResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to read rule file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn check_table(table: &RuleTable) -> TriageResult<()> {
        let config_error = |reason: String| Err(TriageError::ConfigError { reason });

        let mut ids = HashSet::new();
        for rule in &table.rules {
            if !ids.insert(rule.id.as_str()) {
                return config_error(format!("duplicate rule id '{}'", rule.id));
            }
            for study in &rule.recommendation.imaging {
                if table.modality(study).is_none() {
                    return config_error(format!(
                        "rule '{}' recommends '{}', which is not in the imaging catalogue",
                        rule.id, study
                    ));
                }
            }
        }

        let mut catalogue_ids = HashSet::new();
        for modality in &table.imaging {
            if !catalogue_ids.insert(modality.id.as_str()) {
                return config_error(format!("duplicate imaging id '{}'", modality.id));
            }
        }
        for modality in &table.imaging {
            if let Some(eq) = &modality.non_ionizing_equivalent {
                match table.modality(eq) {
                    Some(target) if !target.ionizing => {}
                    Some(_) => {
                        return config_error(format!(
                            "'{}' lists '{}' as non-ionizing equivalent, but it is ionizing",
                            modality.id, eq
                        ))
                    }
                    None => {
                        return config_error(format!(
                            "'{}' lists unknown equivalent '{}'",
                            modality.id, eq
                        ))
                    }
                }
            }
        }

        let required = [
            BASELINE_CT,
            BASELINE_MRI,
            table.adaptations.venous_study.as_str(),
        ];
        for id in required {
            if table.modality(id).is_none() {
                return config_error(format!("imaging catalogue lacks required study '{}'", id));
            }
        }
        Ok(())
    }

    pub fn rules(&self) -> &[DecisionRule] {
        &self.table.rules
    }

    pub fn rule(&self, id: &str) -> Option<&DecisionRule> {
        self.table.rules.iter().find(|r| r.id == id)
    }

    pub fn rules_by_category(&self, category: &str) -> Vec<&DecisionRule> {
        self.table
            .rules
            .iter()
            .filter(|r| r.category == category)
            .collect()
    }

    pub fn modality(&self, id: &str) -> Option<&ImagingModality> {
        self.table.modality(id)
    }

    pub fn catalogue(&self) -> &[ImagingModality] {
        &self.table.imaging
    }

    /// Test one rule against a case.
    ///
    /// `Err(RuleStructure)` when any condition of the rule is invalid, even
    /// if another condition would have settled an `any` rule.
    pub fn matches(&self, rule: &DecisionRule, case: &ClinicalCase) -> TriageResult<bool> {
        if rule.conditions.is_empty() {
            return Err(TriageError::RuleStructure {
                rule_id: rule.id.clone(),
                reason: "empty condition set".to_string(),
            });
        }
        let conditions = rule
            .conditions
            .iter()
            .map(|(key, value)| Condition::parse(key, value))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| TriageError::RuleStructure {
                rule_id: rule.id.clone(),
                reason,
            })?;

        Ok(match rule.mode {
            MatchMode::All => conditions.iter().all(|c| c.holds(case)),
            MatchMode::Any => conditions.iter().any(|c| c.holds(case)),
        })
    }

    /// Run the table against a case, first match wins.
    pub fn evaluate(&self, case: &ClinicalCase) -> DecisionOutcome {
        let mut rule_errors = Vec::new();
        for rule in &self.table.rules {
            match self.matches(rule, case) {
                Ok(true) => {
                    debug!(rule_id = %rule.id, "rule matched");
                    return DecisionOutcome {
                        recommendation: self.adapt(case, rule.to_recommendation()),
                        matched: Some(rule.id.clone()),
                        rule_errors,
                    };
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "rule skipped");
                    rule_errors.push(e);
                }
            }
        }

        let recommendation = self.adapt(case, profile_fallback(case));
        debug!(
            applied_rule_id = %recommendation.applied_rule_id,
            profile = %case.profile,
            "no rule matched; using profile fallback"
        );
        DecisionOutcome {
            recommendation,
            matched: None,
            rule_errors,
        }
    }

    /// Every matching rule id plus the one that would be applied.
    pub fn explain(&self, case: &ClinicalCase) -> Explanation {
        let matching_rule_ids = self
            .table
            .rules
            .iter()
            .filter(|r| matches!(self.matches(r, case), Ok(true)))
            .map(|r| r.id.clone())
            .collect();
        let outcome = self.evaluate(case);
        Explanation {
            matching_rule_ids,
            applied_rule_id: outcome.recommendation.applied_rule_id.clone(),
            rule_errors: outcome.rule_errors.iter().map(|e| e.to_string()).collect(),
            recommendation: outcome.recommendation,
        }
    }

    /// All structural errors of the table, evaluated against an empty case.
    pub fn validate(&self) -> Vec<TriageError> {
        let probe = ClinicalCase::default();
        self.table
            .rules
            .iter()
            .filter_map(|r| self.matches(r, &probe).err())
            .collect()
    }

    fn adapt(&self, case: &ClinicalCase, recommendation: ImagingRecommendation) -> ImagingRecommendation {
        adapt::apply(case, recommendation, &self.table.imaging, &self.table.adaptations)
    }
}

impl DecisionEngine for TomlDecisionEngine {
    fn decide(&self, case: &ClinicalCase) -> TriageResult<ImagingRecommendation> {
        let outcome = self.evaluate(case);
        if !outcome.rule_errors.is_empty() {
            warn!(
                errors = outcome.rule_errors.len(),
                applied_rule_id = %outcome.recommendation.applied_rule_id,
                "decision reached with malformed rules in the table"
            );
        }
        Ok(outcome.recommendation)
    }

    fn fallback(&self, case: &ClinicalCase, cause: Option<&str>) -> ImagingRecommendation {
        let mut recommendation = profile_fallback(case);
        if let Some(cause) = cause {
            recommendation.comment = format!("{}\n\nFallback cause: {}", recommendation.comment, cause);
        }
        self.adapt(case, recommendation)
    }

    fn imaging_label(&self, imaging_id: &str) -> String {
        self.table
            .modality(imaging_id)
            .map(|m| m.label.clone())
            .unwrap_or_else(|| imaging_id.to_string())
    }
}
