//! The annotated example corpus used by the similarity fallback.
//!
//! ```toml
//! [[examples]]
//! text   = "my neck is so stiff I can't bend it, and I'm burning up"
//! labels = { meningeal_signs = true, fever = true }
//!
//! [[examples]]
//! text   = "electric shocks on one side of the face when I chew"
//! labels = {}
//! [examples.weak_signal]
//! kind        = "neuralgia"
//! description = "pattern suggestive of trigeminal neuralgia"
//! imaging     = "mri_brain"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use triage_contracts::{
    case::{ClinicalField, FindingValue, LabelValue},
    error::{TriageError, TriageResult},
};

#[derive(Debug, Deserialize)]
struct RawCorpus {
    #[serde(default)]
    examples: Vec<RawExample>,
}

#[derive(Debug, Deserialize)]
struct RawExample {
    text: String,
    #[serde(default)]
    labels: BTreeMap<String, LabelValue>,
    #[serde(default)]
    weak_signal: Option<WeakSignalLabel>,
}

/// A differential-diagnosis annotation attached to an example.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WeakSignalLabel {
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub imaging: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// One annotated sentence with typed labels.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusExample {
    pub text: String,
    pub labels: BTreeMap<ClinicalField, FindingValue>,
    pub weak_signal: Option<WeakSignalLabel>,
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub examples: Vec<CorpusExample>,
}

impl Corpus {
    pub fn from_toml_str(s: &str) -> TriageResult<Self> {
        let raw: RawCorpus = toml::from_str(s).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to parse corpus TOML: {e}"),
        })?;

        let mut examples = Vec::with_capacity(raw.examples.len());
        for (i, ex) in raw.examples.into_iter().enumerate() {
            if ex.text.trim().is_empty() {
                return Err(TriageError::ConfigError {
                    reason: format!("corpus example #{i} has empty text"),
                });
            }
            let mut labels = BTreeMap::new();
            for (key, raw_value) in &ex.labels {
                let field: ClinicalField = key.parse().map_err(|_| TriageError::ConfigError {
                    reason: format!("corpus example #{i}: unknown field '{key}'"),
                })?;
                labels.insert(field, field.typed(raw_value)?);
            }
            examples.push(CorpusExample {
                text: ex.text,
                labels,
                weak_signal: ex.weak_signal,
            });
        }
        Ok(Self { examples })
    }

    pub fn from_file(path: &Path) -> TriageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TriageError::ConfigError {
            reason: format!("cannot read corpus file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use triage_contracts::case::Onset;

    use super::*;

    const CORPUS: &str = r#"
[[examples]]
text = "stiff neck and burning up"
labels = { meningeal_signs = true, fever = true }

[[examples]]
text = "it hit me like a bolt out of nowhere"
labels = { onset = "sudden-maximal" }

[[examples]]
text = "shooting pain in the cheek when chewing"
[examples.weak_signal]
kind = "neuralgia"
description = "pattern suggestive of trigeminal neuralgia"
imaging = "mri_brain"
"#;

    #[test]
    fn parses_typed_labels_and_weak_signals() {
        let corpus = Corpus::from_toml_str(CORPUS).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(
            corpus.examples[0].labels[&ClinicalField::Fever],
            FindingValue::Flag(true)
        );
        assert_eq!(
            corpus.examples[1].labels[&ClinicalField::Onset],
            FindingValue::Onset(Onset::SuddenMaximal)
        );
        let signal = corpus.examples[2].weak_signal.as_ref().unwrap();
        assert_eq!(signal.kind, "neuralgia");
        assert_eq!(signal.imaging.as_deref(), Some("mri_brain"));
        assert!(corpus.examples[2].labels.is_empty());
    }

    #[test]
    fn unknown_field_is_config_error() {
        let bad = r#"
[[examples]]
text = "x"
labels = { photophobia = true }
"#;
        match Corpus::from_toml_str(bad) {
            Err(TriageError::ConfigError { reason }) => assert!(reason.contains("photophobia")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn mistyped_label_is_config_error() {
        let bad = r#"
[[examples]]
text = "x"
labels = { fever = "high" }
"#;
        match Corpus::from_toml_str(bad) {
            Err(TriageError::ConfigError { .. }) => {}
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn empty_text_is_rejected() {
        let bad = "[[examples]]\ntext = \"  \"\n";
        assert!(Corpus::from_toml_str(bad).is_err());
    }
}
