//! # triage-clinical
//!
//! The shipped clinical content of the headache triage engine and its
//! default wiring.
//!
//! - `config/vocabulary.toml`: bilingual concept vocabulary for the rule layer
//! - `config/rules.toml`: ordered imaging decision rules and the study catalogue
//! - `config/corpus.toml`: annotated sentences for the similarity fallback
//! - `config/triage.toml`: hybrid thresholds and dialogue limits
//!
//! ```rust,ignore
//! let runtime = triage_clinical::build_default_engine()?;
//! let response = runtime.engine().submit_message(None, "fever 39, stiff neck")?;
//! ```

pub mod runtime;
pub mod scenarios;
pub mod settings;

pub use runtime::{build_default_engine, ClinicalConfig, ClinicalRuntime, PREGNANCY_AVOIDS_IONIZING};
pub use scenarios::{Scenario, ScenarioRun, SCENARIOS};
pub use settings::{EmbeddingSettings, TriageSettings};
