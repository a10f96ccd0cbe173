//! # triage-verify
//!
//! Recommendation verification for the headache triage pipeline.
//!
//! This crate provides [`engine::RecommendationVerifier`], which implements
//! the [`triage_core::traits::Verifier`] trait.  It checks an
//! `ImagingRecommendation` in two phases:
//!
//! 1. **Structural**: JSON Schema validation via the `jsonschema` crate.
//! 2. **Semantic**: built-in safety rules plus named custom rules.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use triage_verify::RecommendationVerifier;
//!
//! let mut verifier = RecommendationVerifier::new();
//! verifier.register_rule("no-weekend-mri", Box::new(|_case, rec| {
//!     rec.imaging.iter().any(|i| i.starts_with("mri")).then(|| "MRI unavailable".to_string())
//! }));
//! ```

pub mod engine;

pub use engine::{recommendation_schema, CustomRuleFn, RecommendationVerifier};
