//! Profile-based recommendations used when no rule matches, or when the
//! dialogue engine cannot trust the rule output.

use triage_contracts::{
    case::{ClinicalCase, TemporalProfile},
    recommendation::{ImagingRecommendation, Urgency},
};

pub const FALLBACK_ACUTE: &str = "FALLBACK_ACUTE";
pub const FALLBACK_SUBACUTE: &str = "FALLBACK_SUBACUTE";
pub const FALLBACK_CHRONIC_RED_FLAGS: &str = "FALLBACK_CHRONIC_RED_FLAGS";
pub const FALLBACK_CHRONIC_NO_FLAGS: &str = "FALLBACK_CHRONIC_NO_FLAGS";
pub const FALLBACK_UNKNOWN: &str = "FALLBACK_UNKNOWN";

/// Catalogue ids the fallbacks rely on.  The rule table must define them.
pub const BASELINE_CT: &str = "ct-head-non-contrast";
pub const BASELINE_MRI: &str = "mri-brain";

pub fn profile_fallback(case: &ClinicalCase) -> ImagingRecommendation {
    let (imaging, urgency, comment, id): (Vec<&str>, Urgency, &str, &str) = match case.profile {
        TemporalProfile::Acute => (
            vec![BASELINE_CT],
            Urgency::Urgent,
            "Unusual acute headache with no specific rule match. Head CT to exclude a \
             serious secondary cause (subarachnoid haemorrhage, meningitis, mass lesion). \
             Full neurological examination required.",
            FALLBACK_ACUTE,
        ),
        TemporalProfile::Subacute => (
            vec![BASELINE_MRI],
            Urgency::Delayed,
            "Subacute, progressively worsening headache. Brain MRI to look for a mass \
             lesion, raised intracranial pressure or venous thrombosis. Neurology review \
             within 7 days.",
            FALLBACK_SUBACUTE,
        ),
        TemporalProfile::Chronic if case.red_flags_present() => (
            vec![BASELINE_MRI],
            Urgency::Urgent,
            "Chronic headache with warning signs. Brain MRI to exclude a secondary \
             process. Urgent neurology review.",
            FALLBACK_CHRONIC_RED_FLAGS,
        ),
        TemporalProfile::Chronic => (
            vec![],
            Urgency::None,
            "Chronic headache without warning signs. No routine imaging if the \
             neurological examination is normal. Symptomatic treatment and a planned \
             neurology review if needed.",
            FALLBACK_CHRONIC_NO_FLAGS,
        ),
        TemporalProfile::Unknown => (
            vec![BASELINE_CT],
            Urgency::Urgent,
            "Headache profile could not be classified. A baseline work-up is recommended \
             as a precaution, with neurology review.",
            FALLBACK_UNKNOWN,
        ),
    };
    ImagingRecommendation {
        imaging: imaging.iter().map(|s| s.to_string()).collect(),
        urgency,
        comment: comment.to_string(),
        applied_rule_id: id.to_string(),
    }
}
