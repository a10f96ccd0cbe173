//! Recommendation verification report types.
//!
//! Before a recommendation is rendered to the clinician, the verifier checks
//! it against a structural schema and a set of named safety rules.  Only a
//! passing `VerificationReport` lets it through unchanged.

use serde::{Deserialize, Serialize};

/// The result of running every verification rule against a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// True only if all rules passed.
    pub passed: bool,
    /// All failures collected during this run.  Empty on pass.
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    pub fn from_failures(failures: Vec<VerificationFailure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    /// `[rule] message; [rule] message` summary for logs and rationales.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| format!("[{}] {}", f.rule_id, f.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A single rule failure within a `VerificationReport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub rule_id: String,
    pub message: String,
}
