//! The structured clinical case accumulated over a triage conversation.
//!
//! Every boolean finding is tri-state (`Option<bool>`): `None` means the
//! finding has not been established and is never read as `false`.  Closed
//! enumerations carry the categorical fields and serialize as kebab-case
//! strings, the same spelling used by the rule and vocabulary tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TriageError;

/// Episode length below which a headache counts as acute (7 days).
pub const ACUTE_MAX_HOURS: f64 = 168.0;

/// Episode length below which a headache counts as subacute (90 days).
pub const SUBACUTE_MAX_HOURS: f64 = 2160.0;

/// Implements `as_str`, `Display` and `FromStr` for a closed string enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The kebab-case spelling used in configuration tables.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TriageError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(TriageError::InvalidInput {
                        reason: format!("unknown {} value '{}'", stringify!($name), other),
                    }),
                }
            }
        }
    };
}

// ── Categorical fields ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sex {
    Male,
    Female,
    Other,
    #[default]
    Unspecified,
}

string_enum!(Sex {
    Male => "male",
    Female => "female",
    Other => "other",
    Unspecified => "unspecified",
});

/// How the headache appeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Onset {
    /// Maximal intensity within seconds to a minute ("thunderclap").
    SuddenMaximal,
    Progressive,
    Chronic,
    #[default]
    Unknown,
}

string_enum!(Onset {
    SuddenMaximal => "sudden-maximal",
    Progressive => "progressive",
    Chronic => "chronic",
    Unknown => "unknown",
});

/// Bucketed duration of the current episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemporalProfile {
    /// Under 7 days.
    Acute,
    /// 7 to 90 days.
    Subacute,
    /// Over 90 days.
    Chronic,
    #[default]
    Unknown,
}

string_enum!(TemporalProfile {
    Acute => "acute",
    Subacute => "subacute",
    Chronic => "chronic",
    Unknown => "unknown",
});

impl TemporalProfile {
    /// Bucket an episode length in hours.
    pub fn from_hours(hours: f64) -> Self {
        if hours < ACUTE_MAX_HOURS {
            TemporalProfile::Acute
        } else if hours < SUBACUTE_MAX_HOURS {
            TemporalProfile::Subacute
        } else {
            TemporalProfile::Chronic
        }
    }
}

/// Clinical headache phenotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phenotype {
    MigraineLike,
    TensionLike,
    RaisedIcpLike,
    ClusterLike,
    #[default]
    Unknown,
}

string_enum!(Phenotype {
    MigraineLike => "migraine-like",
    TensionLike => "tension-like",
    RaisedIcpLike => "raised-icp-like",
    ClusterLike => "cluster-like",
    Unknown => "unknown",
});

// ── Field taxonomy ────────────────────────────────────────────────────────────

/// Names every field of a `ClinicalCase`.
///
/// The snake_case spelling is the key used by rule conditions, confidence
/// maps, dialogue history and corpus labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClinicalField {
    Age,
    Sex,
    Onset,
    Profile,
    EpisodeHours,
    Intensity,
    Fever,
    MeningealSigns,
    NeuroDeficit,
    Seizure,
    RaisedIcp,
    PregnancyPostpartum,
    Trauma,
    RecentPuncture,
    Immunosuppression,
    RecentPatternChange,
    CancerHistory,
    Vertigo,
    Tinnitus,
    JointPain,
    GiantCellArteritis,
    Phenotype,
    RiskContexts,
}

string_enum!(ClinicalField {
    Age => "age",
    Sex => "sex",
    Onset => "onset",
    Profile => "profile",
    EpisodeHours => "episode_hours",
    Intensity => "intensity",
    Fever => "fever",
    MeningealSigns => "meningeal_signs",
    NeuroDeficit => "neuro_deficit",
    Seizure => "seizure",
    RaisedIcp => "raised_icp",
    PregnancyPostpartum => "pregnancy_postpartum",
    Trauma => "trauma",
    RecentPuncture => "recent_puncture",
    Immunosuppression => "immunosuppression",
    RecentPatternChange => "recent_pattern_change",
    CancerHistory => "cancer_history",
    Vertigo => "vertigo",
    Tinnitus => "tinnitus",
    JointPain => "joint_pain",
    GiantCellArteritis => "giant_cell_arteritis",
    Phenotype => "phenotype",
    RiskContexts => "risk_contexts",
});

/// The storage shape of a field, used to type-check rule conditions and
/// configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Flag,
    Number,
    Category,
    Tags,
}

/// Fields whose positive value is a red flag on its own.
pub const RED_FLAG_FIELDS: &[ClinicalField] = &[
    ClinicalField::Fever,
    ClinicalField::MeningealSigns,
    ClinicalField::NeuroDeficit,
    ClinicalField::Seizure,
    ClinicalField::RaisedIcp,
    ClinicalField::Trauma,
    ClinicalField::Immunosuppression,
    ClinicalField::CancerHistory,
    ClinicalField::Vertigo,
    ClinicalField::GiantCellArteritis,
];

impl ClinicalField {
    pub fn kind(&self) -> FieldKind {
        match self {
            ClinicalField::Age | ClinicalField::EpisodeHours | ClinicalField::Intensity => {
                FieldKind::Number
            }
            ClinicalField::Sex
            | ClinicalField::Onset
            | ClinicalField::Profile
            | ClinicalField::Phenotype => FieldKind::Category,
            ClinicalField::RiskContexts => FieldKind::Tags,
            _ => FieldKind::Flag,
        }
    }

    /// Convert a raw configuration value into a typed finding for this field.
    ///
    /// Flags accept booleans, categorical fields accept their kebab-case
    /// spelling.  Anything else is a `ConfigError`.
    pub fn typed(&self, raw: &LabelValue) -> Result<FindingValue, TriageError> {
        let mismatch = || TriageError::ConfigError {
            reason: format!("value {:?} does not fit field '{}'", raw, self),
        };
        match (self.kind(), raw) {
            (FieldKind::Flag, LabelValue::Flag(b)) => Ok(FindingValue::Flag(*b)),
            (FieldKind::Category, LabelValue::Text(s)) => {
                let value = match self {
                    ClinicalField::Onset => FindingValue::Onset(s.parse().map_err(|_| mismatch())?),
                    ClinicalField::Profile => {
                        FindingValue::Profile(s.parse().map_err(|_| mismatch())?)
                    }
                    ClinicalField::Phenotype => {
                        FindingValue::Phenotype(s.parse().map_err(|_| mismatch())?)
                    }
                    ClinicalField::Sex => FindingValue::Sex(s.parse().map_err(|_| mismatch())?),
                    _ => return Err(mismatch()),
                };
                Ok(value)
            }
            _ => Err(mismatch()),
        }
    }
}

/// A label value as written in a configuration table, before typing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Flag(bool),
    Text(String),
}

/// A typed value that a detector or a corpus label can assign to a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum FindingValue {
    Flag(bool),
    Onset(Onset),
    Profile(TemporalProfile),
    Phenotype(Phenotype),
    Sex(Sex),
}

impl fmt::Display for FindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingValue::Flag(b) => write!(f, "{}", b),
            FindingValue::Onset(v) => write!(f, "{}", v),
            FindingValue::Profile(v) => write!(f, "{}", v),
            FindingValue::Phenotype(v) => write!(f, "{}", v),
            FindingValue::Sex(v) => write!(f, "{}", v),
        }
    }
}

/// Read-only view of one field, as seen by the decision engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Flag(Option<bool>),
    Number(Option<f64>),
    /// Kebab-case spelling; `unknown` / `unspecified` when not established.
    Category(&'static str),
    Tags(&'a [String]),
}

// ── ClinicalCase ──────────────────────────────────────────────────────────────

/// The accumulating structured record for one patient encounter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicalCase {
    pub age: Option<u8>,
    pub sex: Sex,
    pub onset: Onset,
    pub profile: TemporalProfile,
    /// Duration of the current episode in hours.
    pub episode_hours: Option<f64>,
    /// Pain intensity on a 0-10 scale.
    pub intensity: Option<u8>,

    pub fever: Option<bool>,
    pub meningeal_signs: Option<bool>,
    pub neuro_deficit: Option<bool>,
    pub seizure: Option<bool>,
    pub raised_icp: Option<bool>,
    pub pregnancy_postpartum: Option<bool>,
    pub trauma: Option<bool>,
    /// Lumbar puncture or epidural within the last weeks.
    pub recent_puncture: Option<bool>,
    pub immunosuppression: Option<bool>,
    pub recent_pattern_change: Option<bool>,
    pub cancer_history: Option<bool>,
    pub vertigo: Option<bool>,
    pub tinnitus: Option<bool>,
    pub joint_pain: Option<bool>,
    pub giant_cell_arteritis: Option<bool>,

    pub phenotype: Phenotype,
    pub risk_contexts: Vec<String>,
}

impl ClinicalCase {
    /// Typed read access to one field.
    pub fn value_of(&self, field: ClinicalField) -> FieldValue<'_> {
        match field {
            ClinicalField::Age => FieldValue::Number(self.age.map(f64::from)),
            ClinicalField::EpisodeHours => FieldValue::Number(self.episode_hours),
            ClinicalField::Intensity => FieldValue::Number(self.intensity.map(f64::from)),
            ClinicalField::Sex => FieldValue::Category(self.sex.as_str()),
            ClinicalField::Onset => FieldValue::Category(self.onset.as_str()),
            ClinicalField::Profile => FieldValue::Category(self.profile.as_str()),
            ClinicalField::Phenotype => FieldValue::Category(self.phenotype.as_str()),
            ClinicalField::RiskContexts => FieldValue::Tags(&self.risk_contexts),
            flag => FieldValue::Flag(self.flag(flag)),
        }
    }

    /// The tri-state value of a flag field; `None` for non-flag fields.
    pub fn flag(&self, field: ClinicalField) -> Option<bool> {
        match field {
            ClinicalField::Fever => self.fever,
            ClinicalField::MeningealSigns => self.meningeal_signs,
            ClinicalField::NeuroDeficit => self.neuro_deficit,
            ClinicalField::Seizure => self.seizure,
            ClinicalField::RaisedIcp => self.raised_icp,
            ClinicalField::PregnancyPostpartum => self.pregnancy_postpartum,
            ClinicalField::Trauma => self.trauma,
            ClinicalField::RecentPuncture => self.recent_puncture,
            ClinicalField::Immunosuppression => self.immunosuppression,
            ClinicalField::RecentPatternChange => self.recent_pattern_change,
            ClinicalField::CancerHistory => self.cancer_history,
            ClinicalField::Vertigo => self.vertigo,
            ClinicalField::Tinnitus => self.tinnitus,
            ClinicalField::JointPain => self.joint_pain,
            ClinicalField::GiantCellArteritis => self.giant_cell_arteritis,
            _ => None,
        }
    }

    fn flag_slot(&mut self, field: ClinicalField) -> Option<&mut Option<bool>> {
        let slot = match field {
            ClinicalField::Fever => &mut self.fever,
            ClinicalField::MeningealSigns => &mut self.meningeal_signs,
            ClinicalField::NeuroDeficit => &mut self.neuro_deficit,
            ClinicalField::Seizure => &mut self.seizure,
            ClinicalField::RaisedIcp => &mut self.raised_icp,
            ClinicalField::PregnancyPostpartum => &mut self.pregnancy_postpartum,
            ClinicalField::Trauma => &mut self.trauma,
            ClinicalField::RecentPuncture => &mut self.recent_puncture,
            ClinicalField::Immunosuppression => &mut self.immunosuppression,
            ClinicalField::RecentPatternChange => &mut self.recent_pattern_change,
            ClinicalField::CancerHistory => &mut self.cancer_history,
            ClinicalField::Vertigo => &mut self.vertigo,
            ClinicalField::Tinnitus => &mut self.tinnitus,
            ClinicalField::JointPain => &mut self.joint_pain,
            ClinicalField::GiantCellArteritis => &mut self.giant_cell_arteritis,
            _ => return None,
        };
        Some(slot)
    }

    /// Set a flag field.  Returns false when `field` is not a flag.
    pub fn set_flag(&mut self, field: ClinicalField, value: bool) -> bool {
        match self.flag_slot(field) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    /// Whether `field` holds an established (non-unknown) value.
    pub fn is_known(&self, field: ClinicalField) -> bool {
        match self.value_of(field) {
            FieldValue::Flag(v) => v.is_some(),
            FieldValue::Number(v) => v.is_some(),
            FieldValue::Category(s) => s != "unknown" && s != "unspecified",
            FieldValue::Tags(tags) => !tags.is_empty(),
        }
    }

    /// Assign a typed finding.  Returns false when the value does not fit the field.
    pub fn apply(&mut self, field: ClinicalField, value: FindingValue) -> bool {
        match (field, value) {
            (ClinicalField::Onset, FindingValue::Onset(v)) => self.onset = v,
            (ClinicalField::Profile, FindingValue::Profile(v)) => self.profile = v,
            (ClinicalField::Phenotype, FindingValue::Phenotype(v)) => self.phenotype = v,
            (ClinicalField::Sex, FindingValue::Sex(v)) => self.sex = v,
            (flag, FindingValue::Flag(b)) => return self.set_flag(flag, b),
            _ => return false,
        }
        true
    }

    /// Merge a newer extraction into this case.
    ///
    /// Known values in `newer` overwrite, unknown values in `newer` never
    /// erase what is already known.  Risk-context tags are unioned in
    /// first-seen order.  The result is normalized.
    pub fn merge(&self, newer: &ClinicalCase) -> ClinicalCase {
        let mut merged = self.clone();

        if newer.age.is_some() {
            merged.age = newer.age;
        }
        if newer.sex != Sex::Unspecified {
            merged.sex = newer.sex;
        }
        if newer.onset != Onset::Unknown {
            merged.onset = newer.onset;
        }
        if newer.profile != TemporalProfile::Unknown {
            merged.profile = newer.profile;
        }
        if newer.episode_hours.is_some() {
            merged.episode_hours = newer.episode_hours;
        }
        if newer.intensity.is_some() {
            merged.intensity = newer.intensity;
        }
        if newer.phenotype != Phenotype::Unknown {
            merged.phenotype = newer.phenotype;
        }

        for field in ClinicalField::ALL {
            if let Some(value) = newer.flag(*field) {
                merged.set_flag(*field, value);
            }
        }

        for tag in &newer.risk_contexts {
            if !merged.risk_contexts.contains(tag) {
                merged.risk_contexts.push(tag.clone());
            }
        }

        merged.normalized()
    }

    /// Apply the deterministic inference rules.
    ///
    /// 1. Sudden-maximal onset always means an acute profile.
    /// 2. An unknown profile is derived from onset (progressive onset uses the
    ///    episode length, and defaults to acute when that is unknown).
    /// 3. A still-unknown profile is derived from episode length alone.
    pub fn normalized(mut self) -> ClinicalCase {
        if let Some(profile) = self.inferred_profile() {
            self.profile = profile.0;
        }
        self
    }

    /// The profile the inference rules would assign, with its confidence.
    ///
    /// `None` when the rules leave the current profile untouched.
    pub fn inferred_profile(&self) -> Option<(TemporalProfile, f32)> {
        if self.onset == Onset::SuddenMaximal {
            return (self.profile != TemporalProfile::Acute).then_some((TemporalProfile::Acute, 0.95));
        }
        if self.profile != TemporalProfile::Unknown {
            return None;
        }
        match (self.onset, self.episode_hours) {
            (Onset::Progressive, Some(hours)) => Some((TemporalProfile::from_hours(hours), 0.90)),
            (Onset::Progressive, None) => Some((TemporalProfile::Acute, 0.60)),
            (Onset::Chronic, _) => Some((TemporalProfile::Chronic, 0.90)),
            (_, Some(hours)) => Some((TemporalProfile::from_hours(hours), 0.85)),
            _ => None,
        }
    }

    /// Whether any red-flag finding or risk context is present.
    pub fn red_flags_present(&self) -> bool {
        RED_FLAG_FIELDS.iter().any(|f| self.flag(*f) == Some(true))
            || self.onset == Onset::SuddenMaximal
            || (self.age.is_some_and(|a| a > 50) && self.profile == TemporalProfile::Acute)
            || !self.risk_contexts.is_empty()
    }

    /// The unconditional emergency signatures that end a dialogue at once.
    pub fn emergency_signature(&self) -> bool {
        self.onset == Onset::SuddenMaximal
            || (self.fever == Some(true) && self.meningeal_signs == Some(true))
            || (self.raised_icp == Some(true) && self.neuro_deficit == Some(true))
    }

    pub fn is_chronic(&self) -> bool {
        self.profile == TemporalProfile::Chronic || self.onset == Onset::Chronic
    }
}
