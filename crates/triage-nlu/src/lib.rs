//! # triage-nlu
//!
//! Deterministic language understanding for headache triage.
//!
//! This crate provides:
//! - `normalize`, the text normalizer shared by tables and matcher
//! - `Vocabulary`, the compiled per-concept TOML tables
//! - `Detector`, the generic staged concept matcher
//! - `RuleExtractor`, the rule-layer `CaseExtractor`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use triage_nlu::RuleExtractor;
//!
//! let extractor = RuleExtractor::from_toml_str(include_str!("vocabulary.toml"))?;
//! let (case, metadata) = extractor.extract_rules("fever 39, stiff neck");
//! ```

pub mod demographics;
pub mod extractor;
pub mod matcher;
pub mod normalize;
pub mod vocabulary;

pub use extractor::RuleExtractor;
pub use matcher::Detector;
pub use normalize::normalize;
pub use vocabulary::{ConceptVocabulary, Vocabulary};
