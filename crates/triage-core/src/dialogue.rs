//! The triage dialogue engine: the multi-turn session state machine.
//!
//! Each submitted message runs the same pipeline:
//!
//!   Validate → Session → Direct answer | Extract + Merge → Termination test
//!     → Ask next question | Decide → Verify → Render → Audit
//!
//! A decision failure or a rejected recommendation never surfaces as an
//! error: the engine switches to the profile fallback and records the cause
//! in the rationale.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use triage_contracts::{
    audit::{TurnOutcome, TurnRecord},
    case::{ClinicalCase, ClinicalField},
    error::{TriageError, TriageResult},
    recommendation::ImagingRecommendation,
    session::{DialogueState, SessionSnapshot, TerminationReason, TriageResponse},
};

use crate::{
    prescription,
    questions::{interpret_answer, missing_critical_fields, question_for, rank_unasked},
    render,
    store::{lock_session, Session, SessionHandle, SessionStore},
    termination::{self, TerminationCheck},
    traits::{AuditWriter, CaseExtractor, DecisionEngine, Verifier},
};

/// Dialogue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    /// Messages longer than this many characters are rejected.
    pub max_input_chars: usize,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 5000,
        }
    }
}

/// What the engine does after the termination test.
enum NextStep {
    Ask(ClinicalField),
    Finish(TerminationReason),
}

/// The multi-turn triage engine.
///
/// Owns the trusted collaborators and the session store.  Shared across
/// request handlers by reference or `Arc`; every method takes `&self`.
pub struct TriageEngine {
    extractor: Box<dyn CaseExtractor>,
    decision: Box<dyn DecisionEngine>,
    verifier: Box<dyn Verifier>,
    audit: Box<dyn AuditWriter>,
    sessions: SessionStore,
    config: DialogueConfig,
}

impl TriageEngine {
    pub fn new(
        extractor: Box<dyn CaseExtractor>,
        decision: Box<dyn DecisionEngine>,
        verifier: Box<dyn Verifier>,
        audit: Box<dyn AuditWriter>,
        config: DialogueConfig,
    ) -> Self {
        Self {
            extractor,
            decision,
            verifier,
            audit,
            sessions: SessionStore::new(),
            config,
        }
    }

    /// Explicitly create a session, optionally under a caller-chosen id.
    pub fn open_session(&self, session_id: Option<&str>) -> TriageResult<String> {
        let handle = self.create_session(session_id)?;
        let id = lock_session(&handle)?.id.clone();
        Ok(id)
    }

    /// Create (or rejoin) a session and open its audit chain.
    fn create_session(&self, session_id: Option<&str>) -> TriageResult<SessionHandle> {
        let handle = self.sessions.create(session_id)?;
        let id = lock_session(&handle)?.id.clone();
        self.audit.open(&id)?;
        Ok(handle)
    }

    /// Process one message.
    ///
    /// `session_id = None` creates a new session.  An unknown explicit id is
    /// `SessionNotFound`; blank or oversized text is `InvalidInput`.
    pub fn submit_message(
        &self,
        session_id: Option<&str>,
        text: &str,
    ) -> TriageResult<TriageResponse> {
        // ── Step 1: Validate input ───────────────────────────────────────────
        let text = text.trim();
        if text.is_empty() {
            return Err(TriageError::InvalidInput {
                reason: "message text is empty".to_string(),
            });
        }
        let chars = text.chars().count();
        if chars > self.config.max_input_chars {
            return Err(TriageError::InvalidInput {
                reason: format!(
                    "message has {} characters, limit is {}",
                    chars, self.config.max_input_chars
                ),
            });
        }

        // ── Step 2: Resolve the session and hold its lock for the turn ───────
        let handle = match session_id {
            Some(id) => self.sessions.get(id)?,
            None => self.create_session(None)?,
        };
        let mut session = lock_session(&handle)?;
        // The turn works on a copy; the session is only updated once the
        // audit record is written.
        let mut turn = session.clone();

        debug!(
            session_id = %turn.id,
            turn = turn.message_count + 1,
            awaiting = ?turn.awaiting,
            "processing message"
        );

        // ── Step 3: Direct answer to the awaited field ───────────────────────
        let answered = turn
            .awaiting
            .and_then(|field| interpret_answer(text, field, &turn.case).map(|c| (field, c)));

        let (interpreted, detected, confidence) = match answered {
            Some((field, updated)) => {
                debug!(session_id = %turn.id, field = %field, "message read as direct answer");
                turn.case = updated;
                (true, vec![field], 1.0)
            }
            None => {
                // ── Step 4: Extraction and merge ─────────────────────────────
                let (extracted, metadata) = self.extractor.extract(text)?;
                turn.case = turn.case.merge(&extracted);
                turn.absorb_weak_signals(metadata.weak_signals);
                (false, metadata.detected_fields, metadata.overall_confidence)
            }
        };
        turn.message_count += 1;
        turn.awaiting = None;
        turn.last_confidence = confidence;

        // ── Step 5: Termination test and next field ──────────────────────────
        let missing = missing_critical_fields(&turn.case);
        let next = match termination::evaluate(&turn.case, &missing) {
            TerminationCheck::Terminate(reason) => NextStep::Finish(reason),
            TerminationCheck::NeedsPatternChange
                if !turn.asked_fields.contains(&ClinicalField::RecentPatternChange) =>
            {
                NextStep::Ask(ClinicalField::RecentPatternChange)
            }
            TerminationCheck::NeedsPatternChange | TerminationCheck::Continue => {
                match rank_unasked(&missing, &turn.asked_fields).first() {
                    Some(field) => NextStep::Ask(*field),
                    None => NextStep::Finish(TerminationReason::QuestionsExhausted),
                }
            }
        };

        match next {
            // ── Step 6a: Ask the next question ───────────────────────────────
            NextStep::Ask(field) => {
                turn.ask(field);
                turn.state = DialogueState::Collecting;

                let record = self.turn_record(&turn, chars, interpreted, &detected, TurnOutcome::Question { field });
                self.audit.write(&record)?;

                let message = render::clarification(!detected.is_empty(), question_for(field));
                let response = TriageResponse {
                    message,
                    session_id: turn.id.clone(),
                    next_question: Some(field),
                    case: turn.case.clone(),
                    requires_more_info: true,
                    dialogue_complete: false,
                    imaging_recommendation: None,
                    termination: None,
                    confidence,
                };
                *session = turn;
                Ok(response)
            }

            // ── Step 6b: Decide, verify, render, audit ───────────────────────
            NextStep::Finish(reason) => {
                let (recommendation, fallback_cause) = self.conclude(&turn.case);

                info!(
                    session_id = %turn.id,
                    reason = %reason,
                    rule_id = %recommendation.applied_rule_id,
                    urgency = %recommendation.urgency,
                    "dialogue terminated"
                );

                turn.state = DialogueState::Terminated(reason);
                turn.last_recommendation = Some(recommendation.clone());

                let record = self.turn_record(
                    &turn,
                    chars,
                    interpreted,
                    &detected,
                    TurnOutcome::Decision {
                        reason,
                        recommendation: recommendation.clone(),
                        fallback_cause,
                    },
                );
                self.audit.write(&record)?;

                let message =
                    render::final_message(&recommendation, &turn.weak_signals, self.decision.as_ref());
                let response = TriageResponse {
                    message,
                    session_id: turn.id.clone(),
                    next_question: None,
                    case: turn.case.clone(),
                    requires_more_info: false,
                    dialogue_complete: true,
                    imaging_recommendation: Some(recommendation),
                    termination: Some(reason),
                    confidence,
                };
                *session = turn;
                Ok(response)
            }
        }
    }

    /// Run the decision engine and the verifier, falling back on any failure.
    ///
    /// Returns the recommendation and, when the fallback was used, its cause.
    fn conclude(&self, case: &ClinicalCase) -> (ImagingRecommendation, Option<String>) {
        let recommendation = match self.decision.decide(case) {
            Ok(recommendation) => recommendation,
            Err(e) => {
                warn!(error = %e, "decision failed, using profile fallback");
                let cause = e.to_string();
                return (self.decision.fallback(case, Some(&cause)), Some(cause));
            }
        };

        let failure = match self.verifier.verify(case, &recommendation) {
            Ok(report) if report.passed => return (recommendation, None),
            Ok(report) => TriageError::VerificationFailed {
                reason: report.summary(),
            },
            Err(e) => e,
        };

        warn!(
            rule_id = %recommendation.applied_rule_id,
            error = %failure,
            "recommendation rejected, using profile fallback"
        );
        let cause = failure.to_string();
        (self.decision.fallback(case, Some(&cause)), Some(cause))
    }

    fn turn_record(
        &self,
        session: &Session,
        input_chars: usize,
        interpreted: bool,
        detected: &[ClinicalField],
        outcome: TurnOutcome,
    ) -> TurnRecord {
        TurnRecord {
            session_id: session.id.clone(),
            turn: session.message_count,
            input_chars,
            interpreted_as_answer: interpreted,
            detected_fields: detected.to_vec(),
            case: session.case.clone(),
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// Snapshot of a session.
    pub fn session_info(&self, session_id: &str) -> TriageResult<SessionSnapshot> {
        let handle = self.sessions.get(session_id)?;
        let session = lock_session(&handle)?;
        Ok(session.snapshot())
    }

    /// Render the imaging prescription for a session.
    ///
    /// Uses the session's final recommendation, or decides on the current
    /// case when the dialogue has not terminated yet.
    pub fn prescription(&self, session_id: &str, prescriber: &str) -> TriageResult<String> {
        let handle = self.sessions.get(session_id)?;
        let session = lock_session(&handle)?;
        if session.message_count == 0 {
            return Err(TriageError::MissingClinicalCase {
                session_id: session_id.to_string(),
            });
        }

        let recommendation = match &session.last_recommendation {
            Some(recommendation) => recommendation.clone(),
            None => self.conclude(&session.case).0,
        };

        Ok(prescription::render(
            &session.case,
            &recommendation,
            prescriber,
            Utc::now(),
            self.decision.as_ref(),
        ))
    }

    /// Discard a session and seal its audit chain.  Returns whether it existed.
    pub fn reset_session(&self, session_id: &str) -> bool {
        let existed = match self.sessions.remove(session_id) {
            Ok(existed) => existed,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "session reset failed");
                return false;
            }
        };
        if existed {
            if let Err(e) = self.audit.finalize(session_id) {
                warn!(session_id = %session_id, error = %e, "audit finalize failed on reset");
            }
            info!(session_id = %session_id, "session reset");
        }
        existed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use triage_contracts::{
        audit::{TurnOutcome, TurnRecord},
        case::{ClinicalCase, ClinicalField, Onset, TemporalProfile},
        error::{TriageError, TriageResult},
        extraction::{ExtractionMetadata, WeakSignal},
        recommendation::{ImagingRecommendation, Urgency},
        session::{DialogueState, TerminationReason},
        verify::{VerificationFailure, VerificationReport},
    };

    use crate::traits::{AuditWriter, CaseExtractor, DecisionEngine, Verifier};

    use super::{DialogueConfig, TriageEngine};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// Returns a scripted case for each exact message text.
    struct ScriptedExtractor {
        script: HashMap<&'static str, ClinicalCase>,
        weak: Vec<WeakSignal>,
    }

    impl ScriptedExtractor {
        fn new(script: Vec<(&'static str, ClinicalCase)>) -> Self {
            Self {
                script: script.into_iter().collect(),
                weak: Vec::new(),
            }
        }
    }

    impl CaseExtractor for ScriptedExtractor {
        fn extract(&self, text: &str) -> TriageResult<(ClinicalCase, ExtractionMetadata)> {
            let case = self.script.get(text).cloned().unwrap_or_default().normalized();
            let mut metadata = ExtractionMetadata::default();
            if case != ClinicalCase::default() {
                metadata.detected_fields.push(ClinicalField::Onset);
                metadata.overall_confidence = 0.9;
            }
            metadata.weak_signals = self.weak.clone();
            Ok((case, metadata))
        }
    }

    /// A decision engine that either succeeds with a fixed rule or fails.
    struct MockDecision {
        fail: bool,
        calls: Arc<Mutex<u32>>,
    }

    impl DecisionEngine for MockDecision {
        fn decide(&self, case: &ClinicalCase) -> TriageResult<ImagingRecommendation> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(TriageError::DecisionFailed {
                    reason: "rule table unavailable".to_string(),
                });
            }
            let urgency = if case.emergency_signature() {
                Urgency::Immediate
            } else {
                Urgency::None
            };
            Ok(ImagingRecommendation {
                imaging: vec!["ct-head-non-contrast".to_string()],
                urgency,
                comment: "matched".to_string(),
                applied_rule_id: "MOCK_001".to_string(),
            })
        }

        fn fallback(&self, _case: &ClinicalCase, cause: Option<&str>) -> ImagingRecommendation {
            ImagingRecommendation {
                imaging: vec!["ct-head-non-contrast".to_string()],
                urgency: Urgency::Urgent,
                comment: format!("fallback; cause: {}", cause.unwrap_or("none")),
                applied_rule_id: "FALLBACK_UNKNOWN".to_string(),
            }
        }
    }

    struct MockVerifier {
        pass: bool,
    }

    impl Verifier for MockVerifier {
        fn verify(
            &self,
            _case: &ClinicalCase,
            _recommendation: &ImagingRecommendation,
        ) -> TriageResult<VerificationReport> {
            let failures = if self.pass {
                vec![]
            } else {
                vec![VerificationFailure {
                    rule_id: "always-fail".to_string(),
                    message: "rejected for test".to_string(),
                }]
            };
            Ok(VerificationReport::from_failures(failures))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingAudit {
        opened: Arc<Mutex<Vec<String>>>,
        records: Arc<Mutex<Vec<TurnRecord>>>,
        finalized: Arc<Mutex<Vec<String>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl AuditWriter for RecordingAudit {
        fn open(&self, session_id: &str) -> TriageResult<()> {
            self.opened.lock().unwrap().push(session_id.to_string());
            Ok(())
        }

        fn write(&self, record: &TurnRecord) -> TriageResult<()> {
            if *self.fail_writes.lock().unwrap() {
                return Err(TriageError::AuditWriteFailed {
                    reason: "disk full".to_string(),
                });
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn finalize(&self, session_id: &str) -> TriageResult<()> {
            self.finalized.lock().unwrap().push(session_id.to_string());
            Ok(())
        }
    }

    fn engine_with(
        extractor: ScriptedExtractor,
        fail_decision: bool,
        pass_verification: bool,
    ) -> (TriageEngine, RecordingAudit, Arc<Mutex<u32>>) {
        let audit = RecordingAudit::default();
        let calls = Arc::new(Mutex::new(0));
        let engine = TriageEngine::new(
            Box::new(extractor),
            Box::new(MockDecision {
                fail: fail_decision,
                calls: Arc::clone(&calls),
            }),
            Box::new(MockVerifier {
                pass: pass_verification,
            }),
            Box::new(audit.clone()),
            DialogueConfig::default(),
        );
        (engine, audit, calls)
    }

    fn engine(script: Vec<(&'static str, ClinicalCase)>) -> (TriageEngine, RecordingAudit) {
        let (engine, audit, _) = engine_with(ScriptedExtractor::new(script), false, true);
        (engine, audit)
    }

    fn chronic(change: Option<bool>) -> ClinicalCase {
        ClinicalCase {
            onset: Onset::Chronic,
            recent_pattern_change: change,
            ..Default::default()
        }
    }

    // ── 1. input validation ──────────────────────────────────────────────────

    #[test]
    fn blank_message_is_invalid_input() {
        let (engine, _) = engine(vec![]);
        match engine.submit_message(None, "   ") {
            Err(TriageError::InvalidInput { reason }) => assert!(reason.contains("empty")),
            other => panic!("expected InvalidInput, got {:?}", other),
        }
        assert_eq!(engine.session_count(), 0, "no session may be created for invalid input");
    }

    #[test]
    fn oversized_message_is_invalid_input() {
        let (engine, _) = engine(vec![]);
        let text = "a".repeat(5001);
        assert!(matches!(
            engine.submit_message(None, &text),
            Err(TriageError::InvalidInput { .. })
        ));
    }

    #[test]
    fn unknown_session_is_not_auto_created() {
        let (engine, _) = engine(vec![]);
        match engine.submit_message(Some("ghost"), "headache") {
            Err(TriageError::SessionNotFound { session_id }) => assert_eq!(session_id, "ghost"),
            other => panic!("expected SessionNotFound, got {:?}", other),
        }
        assert_eq!(engine.session_count(), 0);
    }

    // ── 2. question selection ────────────────────────────────────────────────

    #[test]
    fn first_question_is_highest_priority_missing_field() {
        let (engine, audit) = engine(vec![]);
        let response = engine.submit_message(None, "headache").unwrap();

        assert!(response.requires_more_info);
        assert!(!response.dialogue_complete);
        assert_eq!(response.next_question, Some(ClinicalField::Onset));
        assert!(response.message.contains("thunderclap"));

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0].outcome {
            TurnOutcome::Question { field } => assert_eq!(*field, ClinicalField::Onset),
            other => panic!("expected Question, got {:?}", other),
        }
    }

    #[test]
    fn field_is_never_asked_twice() {
        let (engine, _) = engine(vec![]);
        let first = engine.submit_message(None, "headache").unwrap();
        let id = first.session_id.clone();

        // Not a yes/no answer to onset: falls through to extraction, which finds nothing.
        let second = engine.submit_message(Some(&id), "hard to say").unwrap();
        assert_eq!(second.next_question, Some(ClinicalField::Fever));

        let snapshot = engine.session_info(&id).unwrap();
        assert_eq!(snapshot.asked_fields, vec![ClinicalField::Onset, ClinicalField::Fever]);
        assert_eq!(snapshot.message_count, 2);
    }

    #[test]
    fn yes_no_answer_fills_awaited_field() {
        let (engine, audit) = engine(vec![]);
        let id = engine.submit_message(None, "headache").unwrap().session_id;
        engine.submit_message(Some(&id), "not sure").unwrap(); // now awaiting fever

        let response = engine.submit_message(Some(&id), "no").unwrap();
        assert_eq!(response.case.fever, Some(false));
        assert_eq!(response.next_question, Some(ClinicalField::MeningealSigns));

        let records = audit.records.lock().unwrap();
        assert!(records.last().unwrap().interpreted_as_answer);
    }

    #[test]
    fn exhausted_questions_terminate() {
        let (engine, _) = engine(vec![]);
        let id = engine.submit_message(None, "headache").unwrap().session_id;

        let mut last = None;
        for _ in 0..20 {
            let response = engine.submit_message(Some(&id), "unclear").unwrap();
            if response.dialogue_complete {
                last = Some(response);
                break;
            }
        }
        let response = last.expect("dialogue must terminate once every field was asked");
        assert_eq!(response.termination, Some(TerminationReason::QuestionsExhausted));
        assert!(response.imaging_recommendation.is_some());
    }

    // ── 3. termination policy ────────────────────────────────────────────────

    #[test]
    fn emergency_signature_terminates_immediately() {
        let (engine, _) = engine(vec![(
            "thunderclap",
            ClinicalCase {
                onset: Onset::SuddenMaximal,
                ..Default::default()
            },
        )]);
        let response = engine.submit_message(None, "thunderclap").unwrap();

        assert!(response.dialogue_complete);
        assert_eq!(response.termination, Some(TerminationReason::EmergencyRedFlag));
        assert_eq!(response.case.profile, TemporalProfile::Acute);
        let rec = response.imaging_recommendation.unwrap();
        assert_eq!(rec.urgency, Urgency::Immediate);
        assert!(response.message.starts_with("MEDICAL EMERGENCY DETECTED"));
    }

    #[test]
    fn chronic_stable_terminates_on_single_message() {
        let (engine, _) = engine(vec![("chronic stable", chronic(Some(false)))]);
        let response = engine.submit_message(None, "chronic stable").unwrap();

        assert!(response.dialogue_complete);
        assert_eq!(response.termination, Some(TerminationReason::ChronicStableNoChange));
        assert!(response.case.fever.is_none(), "red flags must stay unknown");
    }

    #[test]
    fn chronic_unknown_change_asks_pattern_change_first() {
        let (engine, _) = engine(vec![("chronic", chronic(None))]);
        let response = engine.submit_message(None, "chronic").unwrap();

        assert!(!response.dialogue_complete);
        assert_eq!(response.next_question, Some(ClinicalField::RecentPatternChange));

        let closing = engine.submit_message(Some(&response.session_id), "no").unwrap();
        assert_eq!(closing.termination, Some(TerminationReason::ChronicStableNoChange));
    }

    // ── 4. decision failures ─────────────────────────────────────────────────

    #[test]
    fn decision_error_falls_back_with_cause() {
        let script = vec![(
            "thunderclap",
            ClinicalCase {
                onset: Onset::SuddenMaximal,
                ..Default::default()
            },
        )];
        let (engine, audit, calls) = engine_with(ScriptedExtractor::new(script), true, true);
        let response = engine.submit_message(None, "thunderclap").unwrap();

        let rec = response.imaging_recommendation.unwrap();
        assert_eq!(rec.applied_rule_id, "FALLBACK_UNKNOWN");
        assert!(rec.comment.contains("rule table unavailable"));
        assert_eq!(*calls.lock().unwrap(), 1);

        let records = audit.records.lock().unwrap();
        match &records[0].outcome {
            TurnOutcome::Decision { fallback_cause, .. } => {
                assert!(fallback_cause.as_deref().unwrap().contains("decision failed"))
            }
            other => panic!("expected Decision, got {:?}", other),
        }
    }

    #[test]
    fn rejected_recommendation_falls_back() {
        let script = vec![("chronic stable", chronic(Some(false)))];
        let (engine, _, _) = engine_with(ScriptedExtractor::new(script), false, false);
        let response = engine.submit_message(None, "chronic stable").unwrap();

        let rec = response.imaging_recommendation.unwrap();
        assert!(rec.is_fallback());
        assert!(rec.comment.contains("always-fail"));
    }

    // ── 5. secondary operations ──────────────────────────────────────────────

    #[test]
    fn weak_signals_accumulate_once_per_kind() {
        let mut extractor = ScriptedExtractor::new(vec![]);
        extractor.weak = vec![WeakSignal {
            kind: "neuralgia".to_string(),
            description: "Trigeminal neuralgia pattern".to_string(),
            similarity: 0.8,
            matched_text: "electric shock pain".to_string(),
            imaging: None,
            note: None,
        }];
        let (engine, _, _) = engine_with(extractor, false, true);
        let id = engine.submit_message(None, "one").unwrap().session_id;
        engine.submit_message(Some(&id), "two").unwrap();

        assert_eq!(engine.session_info(&id).unwrap().weak_signals.len(), 1);
    }

    #[test]
    fn prescription_requires_a_case() {
        let (engine, _) = engine(vec![]);
        let id = engine.open_session(Some("empty")).unwrap();
        match engine.prescription(&id, "Dr. Smith") {
            Err(TriageError::MissingClinicalCase { session_id }) => assert_eq!(session_id, "empty"),
            other => panic!("expected MissingClinicalCase, got {:?}", other),
        }
    }

    #[test]
    fn prescription_lists_studies_and_prescriber() {
        let (engine, _) = engine(vec![(
            "thunderclap",
            ClinicalCase {
                onset: Onset::SuddenMaximal,
                ..Default::default()
            },
        )]);
        let id = engine.submit_message(None, "thunderclap").unwrap().session_id;
        let text = engine.prescription(&id, "Dr. Smith").unwrap();

        assert!(text.contains("Prescriber: Dr. Smith"));
        assert!(text.contains("1. ct-head-non-contrast"));
        assert!(text.contains("IMMEDIATE EMERGENCY"));
        assert!(text.contains("Sudden thunderclap onset"));
    }

    #[test]
    fn reset_removes_session_and_finalizes_audit() {
        let (engine, audit) = engine(vec![]);
        let id = engine.submit_message(None, "headache").unwrap().session_id;

        assert!(engine.reset_session(&id));
        assert!(!engine.reset_session(&id));
        assert!(matches!(
            engine.session_info(&id),
            Err(TriageError::SessionNotFound { .. })
        ));
        assert_eq!(*audit.finalized.lock().unwrap(), vec![id]);
    }

    #[test]
    fn terminated_state_is_visible_in_snapshot() {
        let (engine, _) = engine(vec![("chronic stable", chronic(Some(false)))]);
        let id = engine.submit_message(None, "chronic stable").unwrap().session_id;
        let snapshot = engine.session_info(&id).unwrap();
        assert_eq!(
            snapshot.state,
            DialogueState::Terminated(TerminationReason::ChronicStableNoChange)
        );
        assert!(snapshot.last_recommendation.is_some());
    }

    // ── Audit failures and reopened ids ──

    #[test]
    fn failed_audit_write_leaves_session_untouched() {
        let (engine, audit) = engine(vec![("chronic stable", chronic(Some(false)))]);
        let id = engine.open_session(None).unwrap();
        *audit.fail_writes.lock().unwrap() = true;

        match engine.submit_message(Some(&id), "chronic stable") {
            Err(TriageError::AuditWriteFailed { .. }) => {}
            other => panic!("expected AuditWriteFailed, got {:?}", other),
        }
        let snapshot = engine.session_info(&id).unwrap();
        assert_eq!(snapshot.message_count, 0);
        assert_eq!(snapshot.state, DialogueState::Collecting);
        assert!(snapshot.last_recommendation.is_none());
        assert_eq!(snapshot.case, ClinicalCase::default());

        *audit.fail_writes.lock().unwrap() = false;
        let response = engine.submit_message(Some(&id), "chronic stable").unwrap();
        assert!(response.dialogue_complete);
        assert_eq!(engine.session_info(&id).unwrap().message_count, 1);
        assert_eq!(audit.records.lock().unwrap().len(), 1);
    }

    #[test]
    fn reopening_a_reset_id_opens_the_audit_chain_again() {
        let (engine, audit) = engine(vec![]);
        let id = engine.open_session(Some("consult-7")).unwrap();
        assert_eq!(id, "consult-7");
        engine.submit_message(Some(&id), "headache").unwrap();
        assert!(engine.reset_session(&id));

        engine.open_session(Some("consult-7")).unwrap();
        engine.submit_message(Some("consult-7"), "headache").unwrap();

        assert_eq!(*audit.opened.lock().unwrap(), vec!["consult-7", "consult-7"]);
        assert_eq!(*audit.finalized.lock().unwrap(), vec!["consult-7"]);
        assert_eq!(audit.records.lock().unwrap().len(), 2);
    }
}
