//! Contextual adaptations applied after a recommendation is selected.
//!
//! This pass may rewrite the imaging list and append safety notes to the
//! comment.  It never changes `applied_rule_id` and never removes a study
//! without naming its replacement in the comment.

use triage_contracts::{
    case::{ClinicalCase, Sex},
    recommendation::ImagingRecommendation,
};

use crate::rule::{Adaptations, ImagingModality};

const MRI_CHECKLIST: &[&str] = &[
    "- Recent surgery (< 6 weeks) with implanted material? Wait, or emergency only",
    "- Pacemaker or other implanted device? Check compatibility with the imaging centre",
    "- Heart valve or aortic prosthesis? Send the device references to the imaging centre",
    "- Claustrophobia? Discuss with the imaging centre",
];

pub fn apply(
    case: &ClinicalCase,
    mut recommendation: ImagingRecommendation,
    catalogue: &[ImagingModality],
    adaptations: &Adaptations,
) -> ImagingRecommendation {
    let lookup = |id: &str| catalogue.iter().find(|m| m.id == id);
    let mut contraindications: Vec<String> = Vec::new();
    let mut precautions: Vec<String> = Vec::new();

    // ── Pregnancy ────────────────────────────────────────────────────────────
    if case.pregnancy_postpartum == Some(true) {
        let mut adapted: Vec<String> = Vec::new();
        let mut replaced_any = false;
        precautions.push("PREGNANT OR POSTPARTUM PATIENT:".to_string());
        for id in &recommendation.imaging {
            let substitute = lookup(id)
                .filter(|m| m.ionizing)
                .and_then(|m| m.non_ionizing_equivalent.as_deref());
            match substitute {
                Some(equivalent) => {
                    replaced_any = true;
                    precautions.push(format!(
                        "- {id} replaced by {equivalent} to avoid ionizing radiation"
                    ));
                    if !adapted.iter().any(|a| a == equivalent) {
                        adapted.push(equivalent.to_string());
                    }
                }
                None => {
                    if lookup(id).is_some_and(|m| m.ionizing) {
                        contraindications.push(format!(
                            "- {id} is ionizing and has no non-ionizing equivalent: weigh benefit against fetal exposure"
                        ));
                    }
                    if !adapted.contains(id) {
                        adapted.push(id.clone());
                    }
                }
            }
        }
        if !adapted.contains(&adaptations.venous_study) {
            adapted.push(adaptations.venous_study.clone());
        }
        if replaced_any {
            contraindications.push("- CT contraindicated in early pregnancy outside a vital emergency".to_string());
        }
        if adapted.iter().any(|id| lookup(id).is_some_and(|m| m.is_mri() && m.contrast)) {
            contraindications.push("- Gadolinium contrast to be avoided during pregnancy".to_string());
        }
        precautions.push("- Cerebral venous thrombosis risk is raised in pregnancy and postpartum".to_string());
        recommendation.imaging = adapted;
    }

    let studies: Vec<&ImagingModality> =
        recommendation.imaging.iter().filter_map(|id| lookup(id)).collect();

    // ── Pregnancy test before ionizing imaging ───────────────────────────────
    if case.sex == Sex::Female
        && case.pregnancy_postpartum != Some(true)
        && case.age.is_some_and(|a| a < adaptations.pregnancy_test_max_age)
        && studies.iter().any(|m| m.ionizing)
    {
        precautions.push(format!(
            "WOMAN UNDER {}:",
            adaptations.pregnancy_test_max_age
        ));
        precautions.push("- Urine pregnancy test required before ionizing imaging".to_string());
        precautions.push("- Unless early menopause is confirmed".to_string());
    }

    // ── Contrast ─────────────────────────────────────────────────────────────
    if let Some(study) = studies.iter().find(|m| m.contrast) {
        precautions.push(format!("CONTRAST STUDY ({}):", study.id));
        if case.age.is_some_and(|a| a > adaptations.renal_check_min_age) {
            precautions.push(format!(
                "- Renal function (creatinine) required, patient over {}",
                adaptations.renal_check_min_age
            ));
        }
        precautions.push("- Check for prior contrast allergy".to_string());
    }

    // ── MRI checklist ────────────────────────────────────────────────────────
    if studies.iter().any(|m| m.is_mri()) {
        precautions.push("MRI CHECKS:".to_string());
        precautions.extend(MRI_CHECKLIST.iter().map(|s| s.to_string()));
    }

    if contraindications.is_empty() && precautions.is_empty() {
        return recommendation;
    }
    let mut comment = recommendation.comment.trim_end().to_string();
    if !contraindications.is_empty() {
        comment.push_str("\n\nCONTRAINDICATIONS:\n");
        comment.push_str(&contraindications.join("\n"));
    }
    if !precautions.is_empty() {
        comment.push_str("\n\nPRECAUTIONS:\n");
        comment.push_str(&precautions.join("\n"));
    }
    recommendation.comment = comment;
    recommendation
}

#[cfg(test)]
mod tests {
    use triage_contracts::recommendation::Urgency;

    use super::*;

    fn catalogue() -> Vec<ImagingModality> {
        let m = |id: &str, modality: &str, ionizing: bool, contrast: bool, eq: Option<&str>| {
            ImagingModality {
                id: id.to_string(),
                label: id.to_string(),
                modality: modality.to_string(),
                ionizing,
                contrast,
                non_ionizing_equivalent: eq.map(str::to_string),
            }
        };
        vec![
            m("ct-head-non-contrast", "ct", true, false, Some("mri-brain")),
            m("ct-angiography", "ct", true, true, Some("mr-angiography")),
            m("mri-brain", "mri", false, false, None),
            m("mr-angiography", "mri", false, false, None),
            m("mr-venography", "mri", false, false, None),
            m("mri-brain-gadolinium", "mri", false, true, None),
            m("lumbar-puncture", "procedure", false, false, None),
        ]
    }

    fn rec(imaging: &[&str]) -> ImagingRecommendation {
        ImagingRecommendation {
            imaging: imaging.iter().map(|s| s.to_string()).collect(),
            urgency: Urgency::Immediate,
            comment: "base".to_string(),
            applied_rule_id: "THUNDERCLAP_SAH_001".to_string(),
        }
    }

    #[test]
    fn pregnancy_substitutes_ionizing_studies_and_adds_venous_study() {
        let case = ClinicalCase {
            pregnancy_postpartum: Some(true),
            sex: Sex::Female,
            age: Some(30),
            ..Default::default()
        };
        let out = apply(
            &case,
            rec(&["ct-head-non-contrast", "lumbar-puncture"]),
            &catalogue(),
            &Adaptations::default(),
        );
        assert_eq!(out.imaging, vec!["mri-brain", "lumbar-puncture", "mr-venography"]);
        assert_eq!(out.applied_rule_id, "THUNDERCLAP_SAH_001");
        assert!(out.comment.starts_with("base"));
        assert!(out.comment.contains("ct-head-non-contrast replaced by mri-brain"));
        assert!(out.comment.contains("CONTRAINDICATIONS:"));
        assert!(out.comment.contains("MRI CHECKS:"));
        assert!(!out.comment.contains("pregnancy test"), "no test once pregnancy is known");
    }

    #[test]
    fn young_woman_gets_pregnancy_test_before_ct() {
        let case = ClinicalCase {
            sex: Sex::Female,
            age: Some(34),
            ..Default::default()
        };
        let out = apply(&case, rec(&["ct-head-non-contrast"]), &catalogue(), &Adaptations::default());
        assert_eq!(out.imaging, vec!["ct-head-non-contrast"]);
        assert!(out.comment.contains("Urine pregnancy test"));

        let older = ClinicalCase {
            sex: Sex::Female,
            age: Some(50),
            ..Default::default()
        };
        let out = apply(&older, rec(&["ct-head-non-contrast"]), &catalogue(), &Adaptations::default());
        assert_eq!(out.comment, "base");
    }

    #[test]
    fn contrast_over_sixty_needs_renal_check() {
        let case = ClinicalCase {
            age: Some(72),
            ..Default::default()
        };
        let out = apply(&case, rec(&["ct-angiography"]), &catalogue(), &Adaptations::default());
        assert!(out.comment.contains("Renal function"));
        assert!(out.comment.contains("contrast allergy"));
        assert!(!out.comment.contains("MRI CHECKS"));
    }

    #[test]
    fn any_mri_gets_the_checklist() {
        let out = apply(
            &ClinicalCase::default(),
            rec(&["mri-brain"]),
            &catalogue(),
            &Adaptations::default(),
        );
        assert!(out.comment.contains("PRECAUTIONS:\nMRI CHECKS:"));
        assert!(out.comment.contains("Claustrophobia"));
    }

    #[test]
    fn nothing_to_add_leaves_recommendation_untouched() {
        let original = rec(&["lumbar-puncture"]);
        let out = apply(&ClinicalCase::default(), original.clone(), &catalogue(), &Adaptations::default());
        assert_eq!(out, original);
    }
}
