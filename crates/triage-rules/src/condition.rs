//! Typed rule conditions.
//!
//! A raw `key = value` pair from the rule table is checked against the case
//! schema and turned into a `Condition`.  Anything that does not fit (an
//! unknown field, an operator that does not apply to the field, a value of
//! the wrong type) is a structural error for the rule that holds it.

use std::str::FromStr;

use triage_contracts::case::{
    ClinicalCase, ClinicalField, FieldKind, FieldValue, FindingValue, LabelValue,
};

#[derive(Debug, Clone, PartialEq)]
enum Test {
    /// Exact identity.  `Some(false)` never matches an unknown flag.
    Is(FindingValue),
    /// The field's value is one of these.
    OneOf(Vec<FindingValue>),
    /// At least one tag is among these.
    Tagged(Vec<String>),
    NumberIs(f64),
    /// Unknown, unspecified or an empty tag list.
    Empty,
    Min(f64),
    Max(f64),
    CountMin(usize),
}

/// One checked condition of a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: ClinicalField,
    test: Test,
}

fn split_key(key: &str) -> (&str, Option<&'static str>) {
    for suffix in ["_count_min", "_min", "_max"] {
        if let Some(base) = key.strip_suffix(suffix) {
            if ClinicalField::from_str(key).is_err() {
                return (base, Some(suffix));
            }
        }
    }
    (key, None)
}

fn number(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Integer(i) => Some(*i as f64),
        toml::Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn label(value: &toml::Value) -> Option<LabelValue> {
    match value {
        toml::Value::Boolean(b) => Some(LabelValue::Flag(*b)),
        toml::Value::String(s) => Some(LabelValue::Text(s.clone())),
        _ => None,
    }
}

/// The value a categorical or flag field currently holds.
fn current(case: &ClinicalCase, field: ClinicalField) -> Option<FindingValue> {
    match field {
        ClinicalField::Onset => Some(FindingValue::Onset(case.onset)),
        ClinicalField::Profile => Some(FindingValue::Profile(case.profile)),
        ClinicalField::Phenotype => Some(FindingValue::Phenotype(case.phenotype)),
        ClinicalField::Sex => Some(FindingValue::Sex(case.sex)),
        flag => case.flag(flag).map(FindingValue::Flag),
    }
}

impl Condition {
    /// Check one raw condition against the case schema.
    pub fn parse(key: &str, value: &toml::Value) -> Result<Self, String> {
        let (base, suffix) = split_key(key);
        let field = ClinicalField::from_str(base).map_err(|_| format!("unknown field '{base}'"))?;
        let kind = field.kind();

        let test = match suffix {
            Some("_min") | Some("_max") => {
                if kind != FieldKind::Number {
                    return Err(format!("'{key}': threshold on non-numeric field '{field}'"));
                }
                let n = number(value).ok_or_else(|| format!("'{key}': expected a number"))?;
                if suffix == Some("_min") {
                    Test::Min(n)
                } else {
                    Test::Max(n)
                }
            }
            Some(_) => {
                if kind != FieldKind::Tags {
                    return Err(format!("'{key}': count on non-list field '{field}'"));
                }
                match value {
                    toml::Value::Integer(i) if *i >= 0 => Test::CountMin(*i as usize),
                    _ => return Err(format!("'{key}': expected a non-negative integer")),
                }
            }
            None => Self::equality(field, kind, value).map_err(|e| format!("'{key}': {e}"))?,
        };
        Ok(Self { field, test })
    }

    fn equality(field: ClinicalField, kind: FieldKind, value: &toml::Value) -> Result<Test, String> {
        let typed = |v: &toml::Value| -> Result<FindingValue, String> {
            let raw = label(v).ok_or_else(|| format!("value {v} does not fit field '{field}'"))?;
            field.typed(&raw).map_err(|e| e.to_string())
        };
        let text = |v: &toml::Value| -> Result<String, String> {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("tags of '{field}' must be strings"))
        };

        match (kind, value) {
            (_, toml::Value::Array(items)) if items.is_empty() => Ok(Test::Empty),
            (FieldKind::Tags, toml::Value::Array(items)) => {
                Ok(Test::Tagged(items.iter().map(text).collect::<Result<_, _>>()?))
            }
            (FieldKind::Tags, single) => Ok(Test::Tagged(vec![text(single)?])),
            (FieldKind::Number, v) => number(v)
                .map(Test::NumberIs)
                .ok_or_else(|| format!("expected a number for '{field}'")),
            (_, toml::Value::Array(items)) => {
                Ok(Test::OneOf(items.iter().map(typed).collect::<Result<_, _>>()?))
            }
            (_, v) => Ok(Test::Is(typed(v)?)),
        }
    }

    /// Whether the case satisfies this condition.  Unknown values never
    /// satisfy a threshold.
    pub fn holds(&self, case: &ClinicalCase) -> bool {
        match &self.test {
            Test::Is(expected) => current(case, self.field) == Some(*expected),
            Test::OneOf(options) => {
                current(case, self.field).is_some_and(|v| options.contains(&v))
            }
            Test::Tagged(wanted) => match case.value_of(self.field) {
                FieldValue::Tags(tags) => tags.iter().any(|t| wanted.contains(t)),
                _ => false,
            },
            Test::NumberIs(n) => {
                matches!(case.value_of(self.field), FieldValue::Number(Some(v)) if v == *n)
            }
            Test::Empty => !case.is_known(self.field),
            Test::Min(min) => {
                matches!(case.value_of(self.field), FieldValue::Number(Some(v)) if v >= *min)
            }
            Test::Max(max) => {
                matches!(case.value_of(self.field), FieldValue::Number(Some(v)) if v <= *max)
            }
            Test::CountMin(n) => match case.value_of(self.field) {
                FieldValue::Tags(tags) => tags.len() >= *n,
                _ => false,
            },
        }
    }
}
