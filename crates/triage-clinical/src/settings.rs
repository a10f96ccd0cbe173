//! Shipped clinical tables and runtime settings.
//!
//! The four TOML documents under `config/` are compiled into the binary so
//! the default engine needs no files at run time.  Each can be replaced by
//! a file of the same shape through the `*_from` loaders.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use triage_contracts::error::{TriageError, TriageResult};
use triage_core::DialogueConfig;
use triage_hybrid::HybridConfig;

pub const VOCABULARY_TOML: &str = include_str!("../config/vocabulary.toml");
pub const RULES_TOML: &str = include_str!("../config/rules.toml");
pub const CORPUS_TOML: &str = include_str!("../config/corpus.toml");
pub const SETTINGS_TOML: &str = include_str!("../config/triage.toml");

/// Which sentence encoder backs the similarity fallback.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Directory with `model.onnx` and `tokenizer.json`.  Unset, or a build
    /// without the `onnx` feature, selects the hashing encoder.
    pub model_dir: Option<PathBuf>,
}

/// Runtime settings, read from a document with `[hybrid]`, `[dialogue]` and
/// `[embedding]` tables.  Missing keys take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TriageSettings {
    pub hybrid: HybridConfig,
    pub dialogue: DialogueConfig,
    pub embedding: EmbeddingSettings,
}

impl TriageSettings {
    pub fn from_toml_str(s: &str) -> TriageResult<Self> {
        let settings: TriageSettings = toml::from_str(s).map_err(|e| TriageError::ConfigError {
            reason: format!("failed to parse settings TOML: {}", e),
        })?;
        settings.hybrid.validate()?;
        if settings.dialogue.max_input_chars == 0 {
            return Err(TriageError::ConfigError {
                reason: "dialogue.max_input_chars must be positive".to_string(),
            });
        }
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> TriageResult<Self> {
        Self::from_toml_str(&read(path, "settings")?)
    }

    /// The settings shipped with the crate.
    pub fn shipped() -> TriageResult<Self> {
        Self::from_toml_str(SETTINGS_TOML)
    }
}

pub(crate) fn read(path: &Path, what: &str) -> TriageResult<String> {
    std::fs::read_to_string(path).map_err(|e| TriageError::ConfigError {
        reason: format!("failed to read {} file '{}': {}", what, path.display(), e),
    })
}
