use serde::Serialize;

use crate::Attributes;

/// Result of [`OptimizelyUserContext::decide`](crate::OptimizelyUserContext::decide).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// `None` if the user got no variation (including on error).
    pub variation_key: Option<String>,
    #[allow(missing_docs)]
    pub enabled: bool,
    /// Variable values keyed by variable key. Empty with `ExcludeVariables`.
    pub variables: serde_json::Map<String, serde_json::Value>,
    /// Key of the experiment or rollout rule that produced the decision.
    pub rule_key: Option<String>,
    #[allow(missing_docs)]
    pub flag_key: String,
    #[allow(missing_docs)]
    pub user_id: String,
    /// Attributes of the user context at decision time.
    pub attributes: Attributes,
    /// Errors, followed by informational messages if `IncludeReasons` was set.
    pub reasons: Vec<String>,
}

impl Decision {
    /// Disabled decision carrying only `reasons`.
    pub(crate) fn error(
        flag_key: &str,
        user_id: &str,
        attributes: &Attributes,
        reasons: Vec<String>,
    ) -> Decision {
        Decision {
            variation_key: None,
            enabled: false,
            variables: serde_json::Map::new(),
            rule_key: None,
            flag_key: flag_key.to_owned(),
            user_id: user_id.to_owned(),
            attributes: attributes.clone(),
            reasons,
        }
    }
}
