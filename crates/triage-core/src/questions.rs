//! Critical-field taxonomy, question ranking and answer interpretation.

use triage_contracts::case::{ClinicalCase, ClinicalField, FieldKind, Sex};

/// Static question priority.  Higher is asked first.
///
/// Tiers: emergency red flags, then raised-ICP and neurological signs, then
/// the temporal profile, then risk contexts, then classification.
pub fn priority(field: ClinicalField) -> u16 {
    match field {
        ClinicalField::Onset => 100,
        ClinicalField::Fever | ClinicalField::MeningealSigns => 95,
        ClinicalField::Intensity => 90,
        ClinicalField::RaisedIcp | ClinicalField::NeuroDeficit => 85,
        ClinicalField::Seizure => 80,
        ClinicalField::Profile => 70,
        ClinicalField::RecentPatternChange => 65,
        ClinicalField::PregnancyPostpartum => 60,
        ClinicalField::Trauma => 55,
        ClinicalField::RecentPuncture => 52,
        ClinicalField::Immunosuppression => 50,
        ClinicalField::Phenotype => 30,
        ClinicalField::EpisodeHours => 20,
        _ => 0,
    }
}

/// Critical fields the case does not establish yet.
///
/// Pattern change only matters for a chronic headache, and the pregnancy
/// question is skipped for male patients.
pub fn missing_critical_fields(case: &ClinicalCase) -> Vec<ClinicalField> {
    const ALWAYS: &[ClinicalField] = &[
        ClinicalField::Onset,
        ClinicalField::Fever,
        ClinicalField::MeningealSigns,
        ClinicalField::Intensity,
        ClinicalField::RaisedIcp,
        ClinicalField::NeuroDeficit,
        ClinicalField::Seizure,
        ClinicalField::Profile,
        ClinicalField::Trauma,
        ClinicalField::RecentPuncture,
        ClinicalField::Immunosuppression,
        ClinicalField::Phenotype,
    ];

    let mut missing: Vec<ClinicalField> = ALWAYS
        .iter()
        .copied()
        .filter(|f| !case.is_known(*f))
        .collect();

    if case.is_chronic() && case.recent_pattern_change.is_none() {
        missing.push(ClinicalField::RecentPatternChange);
    }
    if case.sex != Sex::Male && case.pregnancy_postpartum.is_none() {
        missing.push(ClinicalField::PregnancyPostpartum);
    }
    missing
}

/// Drop already-asked fields and sort the rest by descending priority.
///
/// Ties keep taxonomy order, so the ranking is deterministic.
pub fn rank_unasked(missing: &[ClinicalField], asked: &[ClinicalField]) -> Vec<ClinicalField> {
    let mut ranked: Vec<ClinicalField> = missing
        .iter()
        .copied()
        .filter(|f| !asked.contains(f))
        .collect();
    ranked.sort_by_key(|f| std::cmp::Reverse(priority(*f)));
    ranked
}

/// The fixed question template for a field.
pub fn question_for(field: ClinicalField) -> &'static str {
    match field {
        ClinicalField::Onset => {
            "How did the pain start? Suddenly, reaching its maximum within seconds \
             like a thunderclap, progressively, or is it a long-standing headache?"
        }
        ClinicalField::Profile | ClinicalField::EpisodeHours => {
            "How long has the patient had this headache? A few hours or days, \
             several weeks, or months to years?"
        }
        ClinicalField::Intensity => "On a scale from 0 to 10, how intense is the pain?",
        ClinicalField::Fever => "Does the patient have a fever?",
        ClinicalField::MeningealSigns => {
            "Does the patient have a stiff neck, with pain or difficulty bending \
             the head forward?"
        }
        ClinicalField::RaisedIcp => {
            "Is there projectile vomiting, papilledema or transient visual \
             obscurations?"
        }
        ClinicalField::NeuroDeficit => {
            "Does the patient have muscle weakness, speech difficulty or visual \
             disturbance?"
        }
        ClinicalField::Seizure => "Has the patient had a seizure or convulsions?",
        ClinicalField::PregnancyPostpartum => {
            "Is the patient pregnant or has she given birth recently (less than \
             6 weeks ago)?"
        }
        ClinicalField::Trauma => "Has the patient had a recent head injury?",
        ClinicalField::RecentPuncture => {
            "Has the patient had a lumbar puncture or an epidural recently?"
        }
        ClinicalField::Immunosuppression => {
            "Is the patient immunocompromised (HIV, chemotherapy, \
             immunosuppressive treatment, transplant)?"
        }
        ClinicalField::RecentPatternChange => {
            "Has there been a recent change in the patient's headaches \
             (worsening, new symptoms)?"
        }
        ClinicalField::Phenotype => {
            "Can you describe the pain? One side or both, throbbing or pressing \
             like a band, with nausea or sensitivity to light?"
        }
        ClinicalField::Age => "How old is the patient?",
        ClinicalField::Sex => "What is the patient's sex?",
        ClinicalField::CancerHistory => "Does the patient have a history of cancer?",
        ClinicalField::Vertigo => "Does the patient have vertigo?",
        ClinicalField::Tinnitus => "Does the patient have tinnitus?",
        ClinicalField::JointPain => "Does the patient have joint or jaw pain?",
        ClinicalField::GiantCellArteritis => {
            "Is there scalp tenderness, jaw claudication or a known temporal arteritis?"
        }
        ClinicalField::RiskContexts => {
            "Any relevant background such as anticoagulation or severe hypertension?"
        }
    }
}

// ── Answer interpretation ─────────────────────────────────────────────────────

const NEGATIVE_WORDS: &[&str] = &[
    "no", "n", "nope", "not", "none", "never", "negative", "absent", "non", "pas", "aucun",
    "aucune", "jamais", "rien",
];

const POSITIVE_WORDS: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "positive", "present", "correct", "indeed", "oui",
    "ouais", "affirmatif",
];

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read a message as a direct yes/no answer.  Negative words win.
pub fn yes_no(text: &str) -> Option<bool> {
    let words = tokens(text);
    if words.iter().any(|w| NEGATIVE_WORDS.contains(&w.as_str())) {
        Some(false)
    } else if words.iter().any(|w| POSITIVE_WORDS.contains(&w.as_str())) {
        Some(true)
    } else {
        None
    }
}

/// First integer in 0..=10 found in the message.
pub fn intensity_answer(text: &str) -> Option<u8> {
    tokens(text)
        .iter()
        .find_map(|t| t.parse::<u8>().ok())
        .filter(|n| *n <= 10)
}

/// Try to read `text` as a direct answer to `field`.
///
/// Returns the updated case only when the answer changes it; `None` tells
/// the caller to run general extraction instead.
pub fn interpret_answer(text: &str, field: ClinicalField, case: &ClinicalCase) -> Option<ClinicalCase> {
    let mut updated = case.clone();
    match field.kind() {
        FieldKind::Flag => {
            let answer = yes_no(text)?;
            updated.set_flag(field, answer);
        }
        FieldKind::Number if field == ClinicalField::Intensity => {
            updated.intensity = Some(intensity_answer(text)?);
        }
        _ => return None,
    }
    (updated != *case).then(|| updated.normalized())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_wins_over_positive() {
        assert_eq!(yes_no("yes"), Some(true));
        assert_eq!(yes_no("Oui"), Some(true));
        assert_eq!(yes_no("no"), Some(false));
        assert_eq!(yes_no("yes, well no, not really"), Some(false));
        assert_eq!(yes_no("maybe"), None);
    }

    #[test]
    fn intensity_accepts_only_scale_values() {
        assert_eq!(intensity_answer("about 7"), Some(7));
        assert_eq!(intensity_answer("8/10"), Some(8));
        assert_eq!(intensity_answer("15"), None);
        assert_eq!(intensity_answer("very bad"), None);
    }

    #[test]
    fn answer_that_changes_nothing_is_not_consumed() {
        let case = ClinicalCase {
            fever: Some(false),
            ..Default::default()
        };
        assert!(interpret_answer("no", ClinicalField::Fever, &case).is_none());
        let updated = interpret_answer("yes", ClinicalField::Fever, &case).unwrap();
        assert_eq!(updated.fever, Some(true));
    }

    #[test]
    fn categorical_fields_fall_through_to_extraction() {
        let case = ClinicalCase::default();
        assert!(interpret_answer("suddenly", ClinicalField::Onset, &case).is_none());
    }

    #[test]
    fn pattern_change_only_for_chronic_cases() {
        let acute = ClinicalCase::default();
        assert!(!missing_critical_fields(&acute).contains(&ClinicalField::RecentPatternChange));

        let chronic = ClinicalCase {
            onset: triage_contracts::case::Onset::Chronic,
            ..Default::default()
        }
        .normalized();
        assert!(missing_critical_fields(&chronic).contains(&ClinicalField::RecentPatternChange));
    }

    #[test]
    fn pregnancy_not_asked_for_male_patients() {
        let case = ClinicalCase {
            sex: Sex::Male,
            ..Default::default()
        };
        assert!(!missing_critical_fields(&case).contains(&ClinicalField::PregnancyPostpartum));
    }

    #[test]
    fn ranking_skips_asked_and_orders_by_priority() {
        let missing = missing_critical_fields(&ClinicalCase::default());
        let ranked = rank_unasked(&missing, &[ClinicalField::Onset]);
        assert_eq!(ranked[0], ClinicalField::Fever);
        assert_eq!(ranked[1], ClinicalField::MeningealSigns);
        assert_eq!(ranked.last(), Some(&ClinicalField::Phenotype));
        assert!(!ranked.contains(&ClinicalField::Onset));
    }
}
