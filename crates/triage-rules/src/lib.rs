//! # triage-rules
//!
//! A TOML-driven, first-match imaging decision engine.
//!
//! ## Overview
//!
//! This crate provides [`TomlDecisionEngine`], which implements the
//! [`DecisionEngine`](triage_core::traits::DecisionEngine) trait.  Rules are
//! declared in a TOML file and evaluated in order; rule order encodes
//! clinical priority.  If no rule matches, a recommendation is derived from
//! the temporal profile alone.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use triage_rules::TomlDecisionEngine;
//!
//! let engine = TomlDecisionEngine::from_file(Path::new("config/rules.toml"))?;
//! // Pass `engine` to `triage_core::TriageEngine::new(...)`.
//! ```
//!
//! ## Conditions
//!
//! `field = value` tests identity (a list means membership, an empty list
//! means "unknown or empty"); `field_min` / `field_max` are inclusive
//! thresholds that fail on unknown values; `field_count_min` counts tags.

pub mod adapt;
pub mod condition;
pub mod engine;
pub mod fallback;
pub mod rule;

pub use engine::{DecisionOutcome, Explanation, TomlDecisionEngine};
pub use fallback::{
    FALLBACK_ACUTE, FALLBACK_CHRONIC_NO_FLAGS, FALLBACK_CHRONIC_RED_FLAGS, FALLBACK_SUBACUTE,
    FALLBACK_UNKNOWN,
};
pub use rule::{Adaptations, DecisionRule, ImagingModality, MatchMode, RuleTable};

// ── Tests ─────────────────────────────────────────────────────────────────────
