use serde::Serialize;

use crate::{entities::VariableType, Error, Result};

/// Feature variable value coerced to its declared type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum VariableValue {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Json(serde_json::Value),
}

impl VariableValue {
    /// Coerce raw datafile value to `variable_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAttributeValueType`] if `raw` is not a valid value of the type.
    pub fn parse(raw: &str, variable_type: VariableType) -> Result<VariableValue> {
        let invalid = || Error::InvalidAttributeValueType {
            value: raw.to_owned(),
            variable_type,
        };
        let value = match variable_type {
            VariableType::String => VariableValue::String(raw.to_owned()),
            VariableType::Boolean => VariableValue::Boolean(raw.parse().map_err(|_| invalid())?),
            VariableType::Integer => VariableValue::Integer(raw.parse().map_err(|_| invalid())?),
            VariableType::Double => {
                let value: f64 = raw.parse().map_err(|_| invalid())?;
                if !value.is_finite() {
                    return Err(invalid());
                }
                VariableValue::Double(value)
            }
            VariableType::Json => {
                VariableValue::Json(serde_json::from_str(raw).map_err(|_| invalid())?)
            }
        };
        Ok(value)
    }

    /// Return the type of this value.
    pub fn variable_type(&self) -> VariableType {
        match self {
            VariableValue::Boolean(_) => VariableType::Boolean,
            VariableValue::Integer(_) => VariableType::Integer,
            VariableValue::Double(_) => VariableType::Double,
            VariableValue::String(_) => VariableType::String,
            VariableValue::Json(_) => VariableType::Json,
        }
    }

    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            VariableValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            VariableValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            VariableValue::Double(value) => Some(*value),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            VariableValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// Convert to a JSON value, as reported in decisions and notifications.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            VariableValue::Boolean(value) => (*value).into(),
            VariableValue::Integer(value) => (*value).into(),
            VariableValue::Double(value) => (*value).into(),
            VariableValue::String(value) => value.as_str().into(),
            VariableValue::Json(value) => value.clone(),
        }
    }

    /// Unwrap JSON value. Other types are returned as their JSON representation.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            VariableValue::Json(value) => value,
            other => other.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::VariableValue;
    use crate::{entities::VariableType, Error};

    #[test]
    fn parses_declared_types() {
        assert_eq!(
            VariableValue::parse("true", VariableType::Boolean).unwrap(),
            VariableValue::Boolean(true)
        );
        assert_eq!(
            VariableValue::parse("-42", VariableType::Integer).unwrap(),
            VariableValue::Integer(-42)
        );
        assert_eq!(
            VariableValue::parse("0.25", VariableType::Double).unwrap(),
            VariableValue::Double(0.25)
        );
        assert_eq!(
            VariableValue::parse("10", VariableType::String).unwrap(),
            VariableValue::String("10".to_owned())
        );
        assert_eq!(
            VariableValue::parse(r#"{"columns": 2}"#, VariableType::Json).unwrap(),
            VariableValue::Json(json!({"columns": 2}))
        );
    }

    #[test]
    fn rejects_invalid_values() {
        for (raw, variable_type) in [
            ("yes", VariableType::Boolean),
            ("1.5", VariableType::Integer),
            ("not-a-number", VariableType::Integer),
            ("NaN", VariableType::Double),
            ("{columns", VariableType::Json),
        ] {
            assert!(
                matches!(
                    VariableValue::parse(raw, variable_type),
                    Err(Error::InvalidAttributeValueType { .. })
                ),
                "{raw:?} should not parse as {variable_type:?}"
            );
        }
    }

    #[test]
    fn json_representation() {
        assert_eq!(VariableValue::Integer(3).to_json(), json!(3));
        assert_eq!(VariableValue::String("a".to_owned()).to_json(), json!("a"));
        assert_eq!(
            VariableValue::Json(json!({"a": [1]})).into_json(),
            json!({"a": [1]})
        );
    }
}
