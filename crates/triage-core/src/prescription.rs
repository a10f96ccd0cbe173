//! Plain-text imaging prescription document.

use chrono::{DateTime, Utc};

use triage_contracts::{
    case::{ClinicalCase, Onset, Sex, TemporalProfile},
    recommendation::{ImagingRecommendation, Urgency},
};

use crate::traits::DecisionEngine;

/// Age below which a female patient gets the pregnancy-test precaution.
const CHILDBEARING_MAX_AGE: u8 = 50;

fn rule(c: char) -> String {
    std::iter::repeat(c).take(70).collect()
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(rule('-'));
    lines.push(title.to_string());
    lines.push(rule('-'));
}

fn sex_label(sex: Sex) -> &'static str {
    match sex {
        Sex::Male => "Male",
        Sex::Female => "Female",
        Sex::Other => "Other",
        Sex::Unspecified => "Not specified",
    }
}

fn urgency_text(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Immediate => "IMMEDIATE EMERGENCY - to be performed within hours",
        Urgency::Urgent => "URGENT - to be performed within 24 hours",
        Urgency::Delayed => "Semi-urgent - to be performed within 7 days",
        Urgency::None => "Not urgent",
    }
}

/// One-line clinical indication summarising profile, onset, red flags and context.
pub fn clinical_indication(case: &ClinicalCase) -> String {
    let mut parts: Vec<&str> = Vec::new();
    match case.profile {
        TemporalProfile::Acute => parts.push("Acute headache"),
        TemporalProfile::Subacute => parts.push("Subacute headache"),
        TemporalProfile::Chronic => parts.push("Chronic headache"),
        TemporalProfile::Unknown => {}
    }
    match case.onset {
        Onset::SuddenMaximal => parts.push("Sudden thunderclap onset"),
        Onset::Progressive => parts.push("Progressive onset"),
        Onset::Chronic | Onset::Unknown => {}
    }
    let flagged = [
        (case.fever, "Associated fever"),
        (case.meningeal_signs, "Meningeal signs"),
        (case.neuro_deficit, "Focal neurological deficit"),
        (case.seizure, "Seizure"),
        (case.raised_icp, "Signs of raised intracranial pressure"),
        (case.trauma, "Head trauma"),
        (case.immunosuppression, "Immunocompromised patient"),
        (case.cancer_history, "History of cancer"),
    ];
    parts.extend(
        flagged
            .iter()
            .filter(|(flag, _)| *flag == Some(true))
            .map(|(_, text)| *text),
    );

    if parts.is_empty() {
        "Headache to investigate.".to_string()
    } else {
        format!("Headache. {}.", parts.join(". "))
    }
}

/// Render the prescription for `case` and `recommendation`.
pub fn render(
    case: &ClinicalCase,
    recommendation: &ImagingRecommendation,
    prescriber: &str,
    issued_at: DateTime<Utc>,
    decision: &dyn DecisionEngine,
) -> String {
    let mut lines: Vec<String> = vec![
        rule('='),
        "IMAGING PRESCRIPTION".to_string(),
        rule('='),
        String::new(),
        format!("Date: {}", issued_at.format("%d/%m/%Y")),
        format!("Prescriber: {prescriber}"),
        String::new(),
    ];

    section(&mut lines, "PATIENT INFORMATION");
    lines.push(match case.age {
        Some(age) => format!("Age: {age} years"),
        None => "Age: not specified".to_string(),
    });
    lines.push(format!("Sex: {}", sex_label(case.sex)));
    lines.push(String::new());

    let pregnant = case.pregnancy_postpartum == Some(true);
    if pregnant {
        lines.push("CONTEXT: PREGNANT OR POSTPARTUM PATIENT".to_string());
        lines.push(String::new());
    }

    section(&mut lines, "CLINICAL INDICATION");
    lines.push(clinical_indication(case));
    lines.push(String::new());

    section(&mut lines, "STUDIES REQUESTED");
    if recommendation.requires_imaging() {
        for (i, id) in recommendation.imaging.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, decision.imaging_label(id)));
        }
    } else {
        lines.push("No imaging study prescribed".to_string());
    }
    lines.push(String::new());

    section(&mut lines, "URGENCY");
    lines.push(urgency_text(recommendation.urgency).to_string());
    lines.push(String::new());

    if pregnant {
        section(&mut lines, "IMPORTANT PRECAUTIONS");
        lines.push("PREGNANT PATIENT:".to_string());
        let advice: &[&str] = match recommendation.urgency {
            Urgency::Immediate => &[
                "- Life-threatening emergency: CT acceptable (benefit outweighs risk)",
                "- Lead abdominal shielding, minimal dose",
                "- MRI as an alternative if compatible with the emergency",
            ],
            Urgency::Urgent => &[
                "- MRI acceptable as an emergency (venous thrombosis risk outweighs MRI risk)",
                "- CT only if life-threatening or MRI impossible",
            ],
            Urgency::Delayed | Urgency::None => &[
                "- Prefer MRI (avoid CT radiation)",
                "- Avoid MRI in the first trimester unless urgent",
            ],
        };
        lines.extend(advice.iter().map(|s| s.to_string()));
        lines.push("- Gadolinium contraindicated during pregnancy except absolute emergency".to_string());
        lines.push("- Increased risk of cerebral venous thrombosis".to_string());
        lines.push(String::new());
    } else if case.sex == Sex::Female && case.age.is_some_and(|a| a < CHILDBEARING_MAX_AGE) {
        section(&mut lines, "IMPORTANT PRECAUTIONS");
        lines.push("WOMAN OF CHILDBEARING AGE:".to_string());
        lines.push("- Pregnancy test required before any CT".to_string());
        lines.push(String::new());
    }

    section(&mut lines, "CLINICAL INFORMATION");
    lines.push(
        recommendation
            .comment
            .split("\n\n")
            .next()
            .unwrap_or_default()
            .to_string(),
    );
    lines.push(String::new());

    lines.push(String::new());
    lines.push(rule('-'));
    lines.push(String::new());
    lines.push(format!("Prescriber signature: {prescriber}"));
    lines.push(String::new());
    lines.push(rule('='));

    lines.join("\n")
}
