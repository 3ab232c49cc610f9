use std::cmp::Ordering;

use serde_json::Value;

use crate::AttributeValue;

use super::semver;

/// Largest magnitude a numeric condition or attribute may have to be compared.
const MAX_SAFE_NUMBER: f64 = 9_007_199_254_740_992.0; // 2^53

/// How a leaf condition compares an attribute against its value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MatchType {
    Exact,
    Exists,
    Substring,
    Lt,
    Le,
    Gt,
    Ge,
    SemverEq,
    SemverLt,
    SemverLe,
    SemverGt,
    SemverGe,
    /// Checks membership in externally computed segments.
    Qualified,
    /// Match type this SDK does not know about. Always evaluates to UNKNOWN.
    Unknown(String),
}

impl From<&str> for MatchType {
    fn from(value: &str) -> Self {
        match value {
            "exact" => MatchType::Exact,
            "exists" => MatchType::Exists,
            "substring" => MatchType::Substring,
            "lt" => MatchType::Lt,
            "le" => MatchType::Le,
            "gt" => MatchType::Gt,
            "ge" => MatchType::Ge,
            "semver_eq" => MatchType::SemverEq,
            "semver_lt" => MatchType::SemverLt,
            "semver_le" => MatchType::SemverLe,
            "semver_gt" => MatchType::SemverGt,
            "semver_ge" => MatchType::SemverGe,
            "qualified" => MatchType::Qualified,
            other => MatchType::Unknown(other.to_owned()),
        }
    }
}

fn valid_number(value: f64) -> Option<f64> {
    (value.is_finite() && value.abs() <= MAX_SAFE_NUMBER).then_some(value)
}

impl MatchType {
    /// Compare `attribute` against `condition`. `None` means UNKNOWN.
    ///
    /// `Qualified` needs the user's segments and is resolved by the caller.
    pub(crate) fn evaluate(
        &self,
        attribute: Option<&AttributeValue>,
        condition: &Value,
    ) -> Option<bool> {
        let attribute = attribute.filter(|value| !value.is_null());

        match self {
            MatchType::Exists => Some(attribute.is_some()),
            MatchType::Exact => match condition {
                Value::String(expected) => Some(attribute?.as_str()? == expected),
                Value::Bool(expected) => Some(attribute?.as_bool()? == *expected),
                Value::Number(expected) => {
                    let expected = valid_number(expected.as_f64()?)?;
                    let actual = valid_number(attribute?.as_f64()?)?;
                    Some(actual == expected)
                }
                _ => None,
            },
            MatchType::Substring => {
                let expected = condition.as_str()?;
                Some(attribute?.as_str()?.contains(expected))
            }
            MatchType::Lt | MatchType::Le | MatchType::Gt | MatchType::Ge => {
                let expected = valid_number(condition.as_f64()?)?;
                let actual = valid_number(attribute?.as_f64()?)?;
                let ordering = actual.partial_cmp(&expected)?;
                Some(self.accepts(ordering))
            }
            MatchType::SemverEq
            | MatchType::SemverLt
            | MatchType::SemverLe
            | MatchType::SemverGt
            | MatchType::SemverGe => {
                let target = condition.as_str()?;
                let ordering = semver::compare(attribute?.as_str()?, target)?;
                Some(self.accepts(ordering))
            }
            MatchType::Qualified | MatchType::Unknown(_) => None,
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            MatchType::Lt | MatchType::SemverLt => ordering == Ordering::Less,
            MatchType::Le | MatchType::SemverLe => ordering != Ordering::Greater,
            MatchType::Gt | MatchType::SemverGt => ordering == Ordering::Greater,
            MatchType::Ge | MatchType::SemverGe => ordering != Ordering::Less,
            _ => ordering == Ordering::Equal,
        }
    }
}
