use serde_json::{Map, Value};

use crate::Str;

use super::MatchType;

/// Logical operator of an inner tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

impl LogicalOperator {
    fn parse(s: &str) -> Option<LogicalOperator> {
        match s {
            "and" => Some(LogicalOperator::And),
            "or" => Some(LogicalOperator::Or),
            "not" => Some(LogicalOperator::Not),
            _ => None,
        }
    }
}

/// Type of a leaf condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionType {
    /// Matches against a user attribute.
    CustomAttribute,
    /// Matches against externally computed user segments.
    ThirdPartyDimension,
    /// References another audience by id.
    AudienceCondition,
    /// Type this SDK does not know about. Always evaluates to UNKNOWN.
    Unknown(String),
}

impl From<&str> for ConditionType {
    fn from(value: &str) -> Self {
        match value {
            "custom_attribute" => ConditionType::CustomAttribute,
            "third_party_dimension" => ConditionType::ThirdPartyDimension,
            "audience_condition" => ConditionType::AudienceCondition,
            other => ConditionType::Unknown(other.to_owned()),
        }
    }
}

/// A leaf of the condition tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    #[allow(missing_docs)]
    pub condition_type: ConditionType,
    /// Match type. Missing match defaults to `exact`.
    pub match_type: MatchType,
    /// Attribute key. Empty for audience leaves.
    pub name: String,
    /// Condition value. Audience id for audience leaves.
    pub value: Value,
}

impl Condition {
    /// Leaf referencing an audience by id.
    pub fn audience(audience_id: impl Into<String>) -> Condition {
        Condition {
            condition_type: ConditionType::AudienceCondition,
            match_type: MatchType::Exact,
            name: String::new(),
            value: Value::String(audience_id.into()),
        }
    }

    /// Return the referenced audience id if this is an audience leaf.
    pub fn audience_id(&self) -> Option<&str> {
        match (&self.condition_type, &self.value) {
            (ConditionType::AudienceCondition, Value::String(id)) => Some(id),
            _ => None,
        }
    }

    fn from_object(object: &Map<String, Value>) -> Condition {
        let condition_type = object
            .get("type")
            .and_then(Value::as_str)
            .map(ConditionType::from)
            .unwrap_or(ConditionType::CustomAttribute);
        let match_type = object
            .get("match")
            .and_then(Value::as_str)
            .map(MatchType::from)
            .unwrap_or(MatchType::Exact);
        let name = object
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let value = object.get("value").cloned().unwrap_or(Value::Null);
        Condition {
            condition_type,
            match_type,
            name,
            value,
        }
    }
}

/// Compiled audience conditions.
///
/// A tree is either an operator node with children or a single leaf condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTree {
    #[allow(missing_docs)]
    Operator {
        operator: LogicalOperator,
        children: Vec<ConditionTree>,
    },
    #[allow(missing_docs)]
    Leaf(Condition),
}

/// Error produced when conditions JSON has an unexpected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unexpected condition node: {0}")]
pub struct ConditionParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Conditions of an audience. Strings are not allowed in leaf position.
    Audience,
    /// Audience conditions of an experiment. Strings are audience ids.
    Experiment,
}

impl ConditionTree {
    /// Compile audience conditions.
    ///
    /// Legacy audiences carry conditions as a JSON-encoded string, typed audiences carry them as
    /// a JSON array or object. Both are accepted.
    pub fn from_audience_conditions(
        conditions: &Value,
    ) -> Result<ConditionTree, ConditionParseError> {
        match conditions {
            Value::String(encoded) => {
                let decoded: Value = serde_json::from_str(encoded)
                    .map_err(|err| ConditionParseError(err.to_string()))?;
                build(&decoded, Source::Audience)
            }
            other => build(other, Source::Audience),
        }
    }

    /// Compile experiment audience conditions, where leaves are audience ids.
    pub fn from_experiment_conditions(
        conditions: &Value,
    ) -> Result<ConditionTree, ConditionParseError> {
        build(conditions, Source::Experiment)
    }

    /// Compile legacy audience ids into an implicit `or` over those audiences.
    pub fn any_of_audiences<'a>(audience_ids: impl IntoIterator<Item = &'a Str>) -> ConditionTree {
        ConditionTree::Operator {
            operator: LogicalOperator::Or,
            children: audience_ids
                .into_iter()
                .map(|id| ConditionTree::Leaf(Condition::audience(id.as_str())))
                .collect(),
        }
    }

    /// Evaluate the tree with three-valued logic. `None` means UNKNOWN.
    ///
    /// `leaf` evaluates a single condition.
    pub fn evaluate<F>(&self, leaf: &mut F) -> Option<bool>
    where
        F: FnMut(&Condition) -> Option<bool>,
    {
        match self {
            ConditionTree::Leaf(condition) => leaf(condition),
            ConditionTree::Operator { operator, children } => match operator {
                LogicalOperator::And => {
                    let mut unknown = false;
                    for child in children {
                        match child.evaluate(leaf) {
                            Some(false) => return Some(false),
                            Some(true) => {}
                            None => unknown = true,
                        }
                    }
                    if unknown {
                        None
                    } else {
                        Some(true)
                    }
                }
                LogicalOperator::Or => {
                    let mut unknown = false;
                    for child in children {
                        match child.evaluate(leaf) {
                            Some(true) => return Some(true),
                            Some(false) => {}
                            None => unknown = true,
                        }
                    }
                    if unknown {
                        None
                    } else {
                        Some(false)
                    }
                }
                LogicalOperator::Not => children.first()?.evaluate(leaf).map(|result| !result),
            },
        }
    }

    /// Collect ids of all audiences referenced by this tree.
    pub fn audience_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_audience_ids(&mut ids);
        ids
    }

    fn collect_audience_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            ConditionTree::Leaf(condition) => ids.extend(condition.audience_id()),
            ConditionTree::Operator { children, .. } => {
                for child in children {
                    child.collect_audience_ids(ids);
                }
            }
        }
    }
}

fn build(value: &Value, source: Source) -> Result<ConditionTree, ConditionParseError> {
    match value {
        Value::Array(items) => {
            let leading_operator = items
                .first()
                .and_then(Value::as_str)
                .and_then(LogicalOperator::parse);
            let (operator, rest) = match leading_operator {
                Some(operator) => (operator, &items[1..]),
                // A bare list of conditions defaults to `or`.
                None => (LogicalOperator::Or, &items[..]),
            };
            let children = rest
                .iter()
                .map(|item| build(item, source))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ConditionTree::Operator { operator, children })
        }
        Value::Object(object) => Ok(ConditionTree::Leaf(Condition::from_object(object))),
        Value::String(audience_id) if source == Source::Experiment => {
            Ok(ConditionTree::Leaf(Condition::audience(audience_id.as_str())))
        }
        other => Err(ConditionParseError(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Condition, ConditionTree, ConditionType, LogicalOperator};
    use crate::audience::MatchType;

    fn leaf(value: bool) -> ConditionTree {
        ConditionTree::Leaf(Condition {
            condition_type: ConditionType::CustomAttribute,
            match_type: MatchType::Exact,
            name: "flag".to_owned(),
            value: json!(value),
        })
    }

    fn unknown() -> ConditionTree {
        ConditionTree::Leaf(Condition {
            condition_type: ConditionType::Unknown("mystery".to_owned()),
            match_type: MatchType::Exact,
            name: "flag".to_owned(),
            value: json!(null),
        })
    }

    fn node(operator: LogicalOperator, children: Vec<ConditionTree>) -> ConditionTree {
        ConditionTree::Operator { operator, children }
    }

    fn eval(tree: &ConditionTree) -> Option<bool> {
        tree.evaluate(&mut |condition| match condition.condition_type {
            ConditionType::CustomAttribute => condition.value.as_bool(),
            _ => None,
        })
    }

    #[test]
    fn compiles_operator_arrays() {
        let tree = ConditionTree::from_audience_conditions(&json!([
            "and",
            ["or", {"type": "custom_attribute", "name": "a", "value": "x", "match": "exact"}],
            ["not", {"type": "custom_attribute", "name": "b", "value": 1, "match": "gt"}]
        ]))
        .unwrap();

        let ConditionTree::Operator { operator, children } = tree else {
            panic!("expected operator node");
        };
        assert_eq!(operator, LogicalOperator::And);
        assert_eq!(children.len(), 2);
        assert!(matches!(
            &children[1],
            ConditionTree::Operator { operator: LogicalOperator::Not, children }
                if children.len() == 1
        ));
    }

    #[test]
    fn bare_array_defaults_to_or() {
        let tree = ConditionTree::from_experiment_conditions(&json!(["1", "2"])).unwrap();
        assert_eq!(
            tree,
            node(
                LogicalOperator::Or,
                vec![
                    ConditionTree::Leaf(Condition::audience("1")),
                    ConditionTree::Leaf(Condition::audience("2")),
                ]
            )
        );
    }

    #[test]
    fn decodes_legacy_string_conditions() {
        let conditions = concat!(
            r#"["and", ["or", ["or", "#,
            r#"{"name": "browser", "type": "custom_attribute", "value": "chrome"}]]]"#,
        );
        let tree = ConditionTree::from_audience_conditions(&json!(conditions)).unwrap();
        let mut seen = Vec::new();
        tree.evaluate(&mut |condition| {
            seen.push((condition.name.clone(), condition.match_type.clone()));
            Some(true)
        });
        assert_eq!(seen, vec![("browser".to_owned(), MatchType::Exact)]);
    }

    #[test]
    fn rejects_audience_ids_inside_audience_conditions() {
        assert!(ConditionTree::from_audience_conditions(&json!(["and", "1"])).is_err());
    }

    #[test]
    fn collects_audience_ids() {
        let tree =
            ConditionTree::from_experiment_conditions(&json!(["and", "1", ["not", "2"]])).unwrap();
        assert_eq!(tree.audience_ids(), vec!["1", "2"]);
    }

    #[test]
    fn and_semantics() {
        use LogicalOperator::And;
        assert_eq!(eval(&node(And, vec![leaf(true), leaf(true)])), Some(true));
        assert_eq!(eval(&node(And, vec![leaf(true), leaf(false)])), Some(false));
        assert_eq!(eval(&node(And, vec![unknown(), leaf(false)])), Some(false));
        assert_eq!(eval(&node(And, vec![leaf(true), unknown()])), None);
        assert_eq!(eval(&node(And, vec![])), Some(true));
    }

    #[test]
    fn or_semantics() {
        use LogicalOperator::Or;
        assert_eq!(eval(&node(Or, vec![leaf(false), leaf(true)])), Some(true));
        assert_eq!(eval(&node(Or, vec![leaf(false), leaf(false)])), Some(false));
        assert_eq!(eval(&node(Or, vec![unknown(), leaf(true)])), Some(true));
        assert_eq!(eval(&node(Or, vec![leaf(false), unknown()])), None);
        assert_eq!(eval(&node(Or, vec![])), Some(false));
    }

    #[test]
    fn not_semantics() {
        use LogicalOperator::Not;
        assert_eq!(eval(&node(Not, vec![leaf(true)])), Some(false));
        assert_eq!(eval(&node(Not, vec![leaf(false)])), Some(true));
        assert_eq!(eval(&node(Not, vec![unknown()])), None);
        assert_eq!(eval(&node(Not, vec![])), None);
    }

    #[test]
    fn de_morgan_holds_when_defined() {
        use LogicalOperator::{And, Not, Or};
        let values = [leaf(true), leaf(false), unknown()];
        for a in &values {
            for b in &values {
                let lhs = eval(&node(Not, vec![node(And, vec![a.clone(), b.clone()])]));
                let rhs = eval(&node(
                    Or,
                    vec![node(Not, vec![a.clone()]), node(Not, vec![b.clone()])],
                ));
                if lhs.is_some() && rhs.is_some() {
                    assert_eq!(lhs, rhs);
                }

                let lhs = eval(&node(Not, vec![node(Or, vec![a.clone(), b.clone()])]));
                let rhs = eval(&node(
                    And,
                    vec![node(Not, vec![a.clone()]), node(Not, vec![b.clone()])],
                ));
                if lhs.is_some() && rhs.is_some() {
                    assert_eq!(lhs, rhs);
                }
            }
        }
    }
}
