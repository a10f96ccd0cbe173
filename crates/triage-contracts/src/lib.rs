//! # triage-contracts
//!
//! Shared types for the headache triage pipeline.
//!
//! Every crate in the workspace imports from here.  Besides data definitions
//! and error types, this crate holds only the data-level invariants of a
//! `ClinicalCase`: merging, profile inference and the red-flag predicates.

pub mod audit;
pub mod case;
pub mod detection;
pub mod error;
pub mod extraction;
pub mod recommendation;
pub mod session;
pub mod verify;

pub use audit::{TurnOutcome, TurnRecord};
pub use case::{
    ClinicalCase, ClinicalField, FieldKind, FieldValue, FindingValue, LabelValue, Onset,
    Phenotype, Sex, TemporalProfile, RED_FLAG_FIELDS,
};
pub use detection::{DetectionResult, DetectionSource};
pub use error::{TriageError, TriageResult};
pub use extraction::{
    Contradiction, EmbeddingStatus, EnrichedField, Evidence, ExtractionMetadata,
    ExtractionMethod, Neighbour, WeakSignal,
};
pub use recommendation::{ImagingRecommendation, Urgency};
pub use session::{DialogueState, SessionSnapshot, TerminationReason, TriageResponse};
pub use verify::{VerificationFailure, VerificationReport};

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn flags_case(fever: Option<bool>, neck: Option<bool>) -> ClinicalCase {
        ClinicalCase {
            fever,
            meningeal_signs: neck,
            ..Default::default()
        }
    }

    // ── Merge ────────────────────────────────────────────────────────────────

    #[test]
    fn merge_known_overwrites_unknown() {
        let old = flags_case(None, Some(false));
        let new = flags_case(Some(true), None);

        let merged = old.merge(&new);
        assert_eq!(merged.fever, Some(true));
        assert_eq!(merged.meningeal_signs, Some(false));
    }

    #[test]
    fn merge_newer_known_value_wins() {
        let old = flags_case(Some(true), None);
        let new = flags_case(Some(false), None);
        assert_eq!(old.merge(&new).fever, Some(false));
    }

    #[test]
    fn merge_unions_risk_contexts_in_order() {
        let old = ClinicalCase {
            risk_contexts: vec!["anticoagulant".into(), "hypertension".into()],
            ..Default::default()
        };
        let new = ClinicalCase {
            risk_contexts: vec!["hypertension".into(), "hiv".into()],
            ..Default::default()
        };
        assert_eq!(
            old.merge(&new).risk_contexts,
            vec!["anticoagulant", "hypertension", "hiv"]
        );
    }

    #[test]
    fn merge_keeps_sudden_onset_acute() {
        let old = ClinicalCase {
            onset: Onset::SuddenMaximal,
            profile: TemporalProfile::Acute,
            ..Default::default()
        };
        let new = ClinicalCase {
            profile: TemporalProfile::Chronic,
            ..Default::default()
        };
        assert_eq!(old.merge(&new).profile, TemporalProfile::Acute);
    }

    // ── Profile inference ────────────────────────────────────────────────────

    #[test]
    fn progressive_onset_uses_duration_buckets() {
        let case = |hours: Option<f64>| {
            ClinicalCase {
                onset: Onset::Progressive,
                episode_hours: hours,
                ..Default::default()
            }
            .normalized()
            .profile
        };
        assert_eq!(case(Some(48.0)), TemporalProfile::Acute);
        assert_eq!(case(Some(168.0)), TemporalProfile::Subacute);
        assert_eq!(case(Some(2159.0)), TemporalProfile::Subacute);
        assert_eq!(case(Some(2160.0)), TemporalProfile::Chronic);
        // Precautionary default.
        assert_eq!(case(None), TemporalProfile::Acute);
    }

    #[test]
    fn chronic_onset_gives_chronic_profile() {
        let case = ClinicalCase {
            onset: Onset::Chronic,
            ..Default::default()
        }
        .normalized();
        assert_eq!(case.profile, TemporalProfile::Chronic);
        assert!(case.is_chronic());
    }

    #[test]
    fn duration_alone_sets_profile() {
        let case = ClinicalCase {
            episode_hours: Some(24.0 * 30.0),
            ..Default::default()
        }
        .normalized();
        assert_eq!(case.profile, TemporalProfile::Subacute);
    }

    #[test]
    fn explicit_profile_is_not_overridden_by_duration() {
        let case = ClinicalCase {
            profile: TemporalProfile::Chronic,
            episode_hours: Some(2.0),
            ..Default::default()
        }
        .normalized();
        assert_eq!(case.profile, TemporalProfile::Chronic);
    }

    // ── Red flags ────────────────────────────────────────────────────────────

    #[test]
    fn unknown_flags_are_not_red_flags() {
        assert!(!ClinicalCase::default().red_flags_present());
        assert!(!flags_case(Some(false), Some(false)).red_flags_present());
        assert!(flags_case(Some(true), None).red_flags_present());
    }

    #[test]
    fn emergency_signatures() {
        assert!(flags_case(Some(true), Some(true)).emergency_signature());
        assert!(!flags_case(Some(true), None).emergency_signature());

        let icp = ClinicalCase {
            raised_icp: Some(true),
            neuro_deficit: Some(true),
            ..Default::default()
        };
        assert!(icp.emergency_signature());
    }

    #[test]
    fn older_patient_with_acute_headache_is_red_flag() {
        let case = ClinicalCase {
            age: Some(67),
            profile: TemporalProfile::Acute,
            ..Default::default()
        };
        assert!(case.red_flags_present());
    }

    // ── Field taxonomy ───────────────────────────────────────────────────────

    #[test]
    fn field_names_round_trip() {
        for field in ClinicalField::ALL {
            let parsed: ClinicalField = field.as_str().parse().unwrap();
            assert_eq!(parsed, *field);
        }
        assert!("temperature".parse::<ClinicalField>().is_err());
    }

    #[test]
    fn typed_label_values() {
        assert_eq!(
            ClinicalField::Fever.typed(&LabelValue::Flag(true)).unwrap(),
            FindingValue::Flag(true)
        );
        assert_eq!(
            ClinicalField::Onset
                .typed(&LabelValue::Text("sudden-maximal".into()))
                .unwrap(),
            FindingValue::Onset(Onset::SuddenMaximal)
        );

        match ClinicalField::Fever.typed(&LabelValue::Text("yes".into())) {
            Err(TriageError::ConfigError { reason }) => assert!(reason.contains("fever")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn value_of_reports_unknown_categories() {
        let case = ClinicalCase::default();
        assert_eq!(case.value_of(ClinicalField::Onset), FieldValue::Category("unknown"));
        assert_eq!(case.value_of(ClinicalField::Fever), FieldValue::Flag(None));
        assert!(!case.is_known(ClinicalField::Sex));
    }

    #[test]
    fn urgency_orders_by_severity() {
        assert!(Urgency::Immediate > Urgency::Urgent);
        assert!(Urgency::Urgent > Urgency::Delayed);
        assert!(Urgency::Delayed > Urgency::None);
    }

    // ── Error display ────────────────────────────────────────────────────────

    #[test]
    fn error_display_messages() {
        let msg = TriageError::SessionNotFound {
            session_id: "abc".into(),
        }
        .to_string();
        assert!(msg.contains("abc") && msg.contains("not found"));

        let msg = TriageError::RuleStructure {
            rule_id: "R1".into(),
            reason: "unknown field 'colour'".into(),
        }
        .to_string();
        assert!(msg.contains("R1"));
        assert!(msg.contains("colour"));
    }

    #[test]
    fn contradiction_display_uses_field_name() {
        let c = Contradiction::Conflicting {
            field: ClinicalField::Onset,
        };
        assert_eq!(c.to_string(), "onset_conflicting");
    }

    // ── Merge laws ───────────────────────────────────────────────────────────

    fn tri() -> impl Strategy<Value = Option<bool>> {
        prop_oneof![Just(None), Just(Some(true)), Just(Some(false))]
    }

    fn arb_case() -> impl Strategy<Value = ClinicalCase> {
        (
            proptest::option::of(0u8..=120),
            proptest::sample::select(Onset::ALL.to_vec()),
            proptest::sample::select(TemporalProfile::ALL.to_vec()),
            proptest::option::of(0.0f64..20_000.0),
            proptest::option::of(0u8..=10),
            proptest::collection::vec(tri(), 15),
            proptest::collection::vec("[a-z]{3,8}", 0..3),
        )
            .prop_map(|(age, onset, profile, hours, intensity, flags, tags)| {
                let mut case = ClinicalCase {
                    age,
                    onset,
                    profile,
                    episode_hours: hours,
                    intensity,
                    risk_contexts: tags,
                    ..Default::default()
                };
                let flag_fields = ClinicalField::ALL
                    .iter()
                    .filter(|f| f.kind() == FieldKind::Flag);
                for (field, value) in flag_fields.zip(flags) {
                    if let Some(v) = value {
                        case.set_flag(*field, v);
                    }
                }
                let mut seen = Vec::new();
                case.risk_contexts.retain(|t| {
                    let fresh = !seen.contains(t);
                    seen.push(t.clone());
                    fresh
                });
                case.normalized()
            })
    }

    proptest! {
        #[test]
        fn prop_merge_is_idempotent(case in arb_case()) {
            prop_assert_eq!(case.merge(&case), case);
        }

        #[test]
        fn prop_unknown_never_overwrites_known(case in arb_case()) {
            let merged = case.merge(&ClinicalCase::default());
            prop_assert_eq!(merged, case);
        }

        #[test]
        fn prop_known_flag_over_unknown_changes_field(value in any::<bool>(), case in arb_case()) {
            let mut old = case.clone();
            old.fever = None;
            let new = ClinicalCase { fever: Some(value), ..Default::default() };
            prop_assert_eq!(old.merge(&new).fever, Some(value));
        }

        #[test]
        fn prop_sudden_onset_always_acute(case in arb_case(), other in arb_case()) {
            let merged = case.merge(&other);
            if merged.onset == Onset::SuddenMaximal {
                prop_assert_eq!(merged.profile, TemporalProfile::Acute);
            }
        }
    }

    // ── Wire format ──────────────────────────────────────────────────────────

    #[test]
    fn dialogue_state_is_tagged_kebab_case() {
        let terminated = DialogueState::Terminated(TerminationReason::ChronicStableNoChange);
        assert_eq!(
            serde_json::to_value(terminated).unwrap(),
            serde_json::json!({ "state": "terminated", "reason": "chronic-stable-no-change" })
        );
        assert_eq!(
            serde_json::to_value(DialogueState::Collecting).unwrap(),
            serde_json::json!({ "state": "collecting" })
        );
    }

    #[test]
    fn partial_case_json_fills_unknowns() {
        let case: ClinicalCase =
            serde_json::from_str(r#"{"onset": "sudden-maximal", "fever": true}"#).unwrap();
        assert_eq!(case.onset, Onset::SuddenMaximal);
        assert_eq!(case.fever, Some(true));
        assert_eq!(case.meningeal_signs, None);
        assert_eq!(case.age, None);
    }
}
