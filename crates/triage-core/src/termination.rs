//! Termination policy for the dialogue.

use triage_contracts::{
    case::{ClinicalCase, ClinicalField},
    session::TerminationReason,
};

/// Red flags that must all be answered before an aggravated chronic
/// headache can be closed without emergency.
pub const CHRONIC_RED_FLAGS: &[ClinicalField] = &[
    ClinicalField::Fever,
    ClinicalField::MeningealSigns,
    ClinicalField::NeuroDeficit,
    ClinicalField::Seizure,
    ClinicalField::RaisedIcp,
    ClinicalField::Trauma,
];

/// What the termination test concluded for the current case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationCheck {
    Terminate(TerminationReason),
    /// Chronic headache with unknown pattern change: ask about the change next.
    NeedsPatternChange,
    Continue,
}

/// Evaluate the termination rules in order.  `missing` is the list of
/// critical fields still unknown, before filtering out asked fields.
pub fn evaluate(case: &ClinicalCase, missing: &[ClinicalField]) -> TerminationCheck {
    if missing.is_empty() {
        return TerminationCheck::Terminate(TerminationReason::Complete);
    }

    if case.emergency_signature() {
        return TerminationCheck::Terminate(TerminationReason::EmergencyRedFlag);
    }

    if case.is_chronic() {
        match case.recent_pattern_change {
            Some(false) => {
                return TerminationCheck::Terminate(TerminationReason::ChronicStableNoChange)
            }
            Some(true) => {
                let flags: Vec<Option<bool>> =
                    CHRONIC_RED_FLAGS.iter().map(|f| case.flag(*f)).collect();
                if flags.contains(&Some(true)) {
                    return TerminationCheck::Terminate(TerminationReason::EmergencyRedFlag);
                }
                if flags.iter().all(Option::is_some) {
                    return TerminationCheck::Terminate(
                        TerminationReason::ChronicAggravatedCleared,
                    );
                }
            }
            None => return TerminationCheck::NeedsPatternChange,
        }
    }

    TerminationCheck::Continue
}
