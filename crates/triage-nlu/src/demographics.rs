//! Bounded pattern extractors for age, sex, intensity and episode duration.
//!
//! All patterns run on normalized text.  Each extractor returns the value
//! together with the matched evidence, or `None` when nothing matches.

use regex::Regex;

use triage_contracts::{
    case::Sex,
    error::{TriageError, TriageResult},
};

use crate::normalize::find_bounded;

/// Words that turn a following "N years" into a duration, not an age.
const DURATION_LEADS: &[&str] = &[
    "for ", "since ", "past ", "last ", "over ", "depuis ", "il y a ", "pendant ", "dep ",
];

const OBSTETRIC_CUES: &[&str] = &[
    "pregnant", "pregnancy", "postpartum", "post-partum", "gave birth", "enceinte", "grossesse",
    "accouche", "gestante",
];

const FEMALE_WORDS: &[&str] = &[
    "woman", "female", "she", "her", "lady", "girl", "mother", "mrs", "ms", "femme", "patiente",
    "madame", "mme", "fille", "elle",
];

const MALE_WORDS: &[&str] = &[
    "man", "male", "he", "his", "him", "boy", "gentleman", "mr", "homme", "monsieur", "garcon",
];

const NUMBER_WORDS: &[(&str, f64)] = &[
    ("a", 1.0),
    ("an", 1.0),
    ("one", 1.0),
    ("un", 1.0),
    ("une", 1.0),
    ("two", 2.0),
    ("deux", 2.0),
    ("three", 3.0),
    ("trois", 3.0),
    ("four", 4.0),
    ("quatre", 4.0),
    ("few", 3.0),
    ("several", 3.0),
    ("quelques", 3.0),
    ("plusieurs", 3.0),
];

/// A value read from text and the text that evidenced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    pub value: T,
    pub evidence: String,
}

/// Compiled demographic patterns.  Built once per extractor.
#[derive(Debug, Clone)]
pub struct DemographicPatterns {
    age_years: Regex,
    age_label: Regex,
    sex_age_code: Regex,
    gravida_para: Regex,
    amenorrhea_weeks: Regex,
    intensity_scale: Regex,
    intensity_label: Regex,
    unit_follows: Regex,
    duration_lead: Regex,
    duration_ago: Regex,
    duration_bare_hours: Regex,
}

fn compile(pattern: &str) -> TriageResult<Regex> {
    Regex::new(pattern).map_err(|e| TriageError::ConfigError {
        reason: format!("bad demographic pattern '{}': {}", pattern, e),
    })
}

const UNITS: &str = r"(minutes?|mins?|hours?|hrs?|h|heures?|days?|jours?|j|weeks?|wks?|semaines?|sem|months?|mois|years?|yrs?|ans?|annees?)";
const QUANTITY: &str = r"(\d+(?:[.,]\d+)?|an?|one|two|three|four|few|several|un|une|deux|trois|quatre|quelques|plusieurs)";

/// Hours per unit; `None` for an unrecognized unit.
fn unit_hours(unit: &str) -> Option<f64> {
    let hours = match unit {
        "minute" | "minutes" | "min" | "mins" => 1.0 / 60.0,
        "hour" | "hours" | "hr" | "hrs" | "h" | "heure" | "heures" => 1.0,
        "day" | "days" | "jour" | "jours" | "j" => 24.0,
        "week" | "weeks" | "wk" | "wks" | "semaine" | "semaines" | "sem" => 168.0,
        "month" | "months" | "mois" => 720.0,
        "year" | "years" | "yr" | "yrs" | "an" | "ans" | "annee" | "annees" => 8760.0,
        _ => return None,
    };
    Some(hours)
}

fn quantity(raw: &str) -> Option<f64> {
    if let Ok(n) = raw.replace(',', ".").parse::<f64>() {
        return Some(n);
    }
    NUMBER_WORDS
        .iter()
        .find(|(word, _)| *word == raw)
        .map(|(_, n)| *n)
}

impl DemographicPatterns {
    pub fn new() -> TriageResult<Self> {
        Ok(Self {
            age_years: compile(
                r"\b(\d{1,3}) ?-?(?:years?-? ?old|year-old|yo|y/o|yrs? old|ans|an)\b",
            )?,
            age_label: compile(r"\b(?:aged|age|agee?|age de|agee de)\s?:?\s?(\d{1,3})\b")?,
            sex_age_code: compile(r"(?:^|[,;:(] ?)([fhm]) ?(\d{2}) ?(?:a|ans|y|yo)?\b")?,
            gravida_para: compile(r"\bg\d+ ?p\d+\b")?,
            amenorrhea_weeks: compile(r"\b\d{1,2} ?(?:sa|weeks pregnant|weeks of pregnancy)\b")?,
            intensity_scale: compile(r"\b(\d{1,2})(?:-(\d{1,2}))? ?/ ?10\b")?,
            intensity_label: compile(
                r"\b(?:(?:intensity|pain|vas|nrs|eva|evn|intensite|douleur)\s?(?:of |at |a |=|:)?|en\s?[=:])\s?(\d{1,2})\b",
            )?,
            unit_follows: compile(&format!(r"^\s?(?:s|secs?|seconds?|secondes?|{UNITS})\b"))?,
            duration_lead: compile(&format!(
                r"\b(?:for|since|over the last|over the past|past|last|depuis|pendant|dep)\s(?:the\s)?{QUANTITY}\s?{UNITS}\b"
            ))?,
            duration_ago: compile(&format!(
                r"(?:\b{QUANTITY}\s?{UNITS}\s(?:ago)\b|\bil y a\s{QUANTITY}\s?{UNITS}\b)"
            ))?,
            duration_bare_hours: compile(r"\b(\d+(?:[.,]\d+)?)\s?(hours?|hrs?|heures?)\b")?,
        })
    }

    /// Patient age in years, 0 to 120.  Durations ("for 2 years") are rejected.
    pub fn age(&self, text: &str) -> Option<Reading<u8>> {
        for caps in self.age_years.captures_iter(text) {
            let (Some(whole), Some(n)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let before = &text[..whole.start()];
            if DURATION_LEADS.iter().any(|lead| before.ends_with(lead)) || before.ends_with("ago ") {
                continue;
            }
            if text[whole.end()..].trim_start().starts_with("ago") {
                continue;
            }
            if let Some(age) = n.as_str().parse::<u8>().ok().filter(|a| *a <= 120) {
                return Some(Reading {
                    value: age,
                    evidence: whole.as_str().to_string(),
                });
            }
        }

        let by_label = self
            .age_label
            .captures(text)
            .or_else(|| self.sex_age_code.captures(text).filter(|c| c.get(2).is_some()))?;
        let whole = by_label.get(0)?;
        let raw = by_label.get(2).or_else(|| by_label.get(1))?;
        let age = raw.as_str().parse::<u8>().ok().filter(|a| *a <= 120)?;
        Some(Reading {
            value: age,
            evidence: whole.as_str().trim_start_matches([',', ';', ':', '(', ' ']).to_string(),
        })
    }

    /// Patient sex.  Obstetric cues imply female; otherwise the earliest
    /// gendered keyword wins.
    pub fn sex(&self, text: &str) -> Option<Reading<Sex>> {
        if let Some(cue) = OBSTETRIC_CUES.iter().find(|c| find_bounded(text, c, false).is_some()) {
            return Some(Reading {
                value: Sex::Female,
                evidence: cue.to_string(),
            });
        }
        if let Some(m) = self
            .gravida_para
            .find(text)
            .or_else(|| self.amenorrhea_weeks.find(text))
        {
            return Some(Reading {
                value: Sex::Female,
                evidence: m.as_str().to_string(),
            });
        }
        if let Some(code) = self.sex_age_code.captures(text).and_then(|c| c.get(1)) {
            let value = if code.as_str() == "f" { Sex::Female } else { Sex::Male };
            return Some(Reading {
                value,
                evidence: code.as_str().to_string(),
            });
        }

        let earliest = |words: &[&'static str]| {
            words
                .iter()
                .filter_map(|w| find_bounded(text, w, true).map(|pos| (pos, *w)))
                .min()
        };
        let reading = match (earliest(FEMALE_WORDS), earliest(MALE_WORDS)) {
            (Some(f), Some(m)) if m.0 < f.0 => (Sex::Male, m.1),
            (Some(f), _) => (Sex::Female, f.1),
            (None, Some(m)) => (Sex::Male, m.1),
            (None, None) => return None,
        };
        Some(Reading {
            value: reading.0,
            evidence: reading.1.to_string(),
        })
    }

    /// Pain intensity 0 to 10.  Explicit scores beat qualitative words; the
    /// highest explicit score wins and ranges take their upper bound.
    pub fn intensity(&self, text: &str, words: &[(String, u8)]) -> Option<Reading<u8>> {
        let scale = self
            .intensity_scale
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let value = caps.get(2).or_else(|| caps.get(1))?.as_str().parse::<u8>().ok()?;
                (value <= 10).then(|| Reading {
                    value,
                    evidence: whole.as_str().to_string(),
                })
            })
            .max_by_key(|r| r.value);
        if scale.is_some() {
            return scale;
        }

        // A labelled number followed by a time unit is a duration ("pain 3 days").
        for caps in self.intensity_label.captures_iter(text) {
            let (Some(whole), Some(n)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if self.unit_follows.is_match(&text[whole.end()..]) {
                continue;
            }
            if let Some(value) = n.as_str().parse::<u8>().ok().filter(|v| *v <= 10) {
                return Some(Reading {
                    value,
                    evidence: whole.as_str().to_string(),
                });
            }
        }

        words
            .iter()
            .filter(|(word, _)| find_bounded(text, word, true).is_some())
            .max_by_key(|(_, score)| *score)
            .map(|(word, score)| Reading {
                value: *score,
                evidence: word.clone(),
            })
    }

    /// Episode duration in hours.
    pub fn duration_hours(&self, text: &str) -> Option<Reading<f64>> {
        for pattern in [&self.duration_lead, &self.duration_ago] {
            for caps in pattern.captures_iter(text) {
                let groups: Vec<&str> = caps.iter().skip(1).flatten().map(|m| m.as_str()).collect();
                let (Some(whole), [raw_qty, raw_unit]) = (caps.get(0), groups.as_slice()) else {
                    continue;
                };
                if let (Some(qty), Some(per)) = (quantity(raw_qty), unit_hours(raw_unit)) {
                    return Some(Reading {
                        value: qty * per,
                        evidence: whole.as_str().to_string(),
                    });
                }
            }
        }

        let caps = self.duration_bare_hours.captures(text)?;
        let qty = quantity(caps.get(1)?.as_str())?;
        Some(Reading {
            value: qty,
            evidence: caps.get(0)?.as_str().to_string(),
        })
    }
}
