//! Templated user-facing messages.

use triage_contracts::{
    extraction::WeakSignal,
    recommendation::{ImagingRecommendation, Urgency},
};

use crate::traits::DecisionEngine;

pub const DISCLAIMER: &str = "Decision-support tool only. The physician's clinical assessment \
                              prevails. When in doubt, seek a specialist opinion.";

fn header(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Immediate => "MEDICAL EMERGENCY DETECTED",
        Urgency::Urgent => "Urgent consultation recommended",
        Urgency::Delayed => "Medical evaluation recommended",
        Urgency::None => "Assessment complete",
    }
}

fn footer(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Immediate => "Send the patient to the emergency department immediately.",
        Urgency::Urgent => "Medical consultation as soon as possible (within 24 hours).",
        Urgency::Delayed => "Arrange a consultation with the primary care physician.",
        Urgency::None => "Clinical monitoring. Consult again if symptoms worsen.",
    }
}

/// Acknowledge what was understood, then ask the next question.
pub fn clarification(acknowledge: bool, question: &str) -> String {
    if acknowledge {
        format!("Noted. {question}")
    } else {
        question.to_string()
    }
}

/// The closing message: header, rationale, differential, studies, footer
/// and disclaimer.
pub fn final_message(
    recommendation: &ImagingRecommendation,
    weak_signals: &[WeakSignal],
    decision: &dyn DecisionEngine,
) -> String {
    let mut out = String::new();
    out.push_str(header(recommendation.urgency));
    out.push_str("\n\n");
    out.push_str(&recommendation.comment);
    out.push_str("\n\n");

    if !weak_signals.is_empty() {
        out.push_str("Suggested differential (semantic similarity):\n");
        for signal in weak_signals {
            out.push_str(&format!(
                "  - {} (similarity {:.2})\n",
                signal.description, signal.similarity
            ));
            if let Some(imaging) = &signal.imaging {
                out.push_str(&format!("    -> consider {}\n", decision.imaging_label(imaging)));
            }
            if let Some(note) = &signal.note {
                out.push_str(&format!("    -> {note}\n"));
            }
        }
        out.push('\n');
    }

    if recommendation.requires_imaging() {
        out.push_str("Recommended studies:\n");
        for id in &recommendation.imaging {
            out.push_str(&format!("  - {}\n", decision.imaging_label(id)));
        }
        out.push('\n');
    } else {
        out.push_str("No imaging study is needed.\n\n");
    }

    out.push_str(footer(recommendation.urgency));
    out.push_str("\n\n---\n");
    out.push_str(DISCLAIMER);
    out
}
