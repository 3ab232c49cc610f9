//! Forced decisions attached to a user context.
use std::collections::HashMap;

use crate::{entities::Variation, ProjectConfig};

use super::reasons::DecisionReasons;

/// Where a forced decision applies: a whole flag, or one rule of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptimizelyDecisionContext {
    #[allow(missing_docs)]
    pub flag_key: String,
    /// Experiment or rollout rule key. `None` forces the flag as a whole.
    pub rule_key: Option<String>,
}

impl OptimizelyDecisionContext {
    /// Context covering the whole flag.
    pub fn flag(flag_key: impl Into<String>) -> Self {
        OptimizelyDecisionContext {
            flag_key: flag_key.into(),
            rule_key: None,
        }
    }

    /// Context covering one rule of the flag.
    pub fn rule(flag_key: impl Into<String>, rule_key: impl Into<String>) -> Self {
        OptimizelyDecisionContext {
            flag_key: flag_key.into(),
            rule_key: Some(rule_key.into()),
        }
    }
}

/// Variation forced for a decision context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizelyForcedDecision {
    #[allow(missing_docs)]
    pub variation_key: String,
}

impl OptimizelyForcedDecision {
    #[allow(missing_docs)]
    pub fn new(variation_key: impl Into<String>) -> Self {
        OptimizelyForcedDecision {
            variation_key: variation_key.into(),
        }
    }
}

/// Forced decisions of one user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcedDecisions {
    decisions: HashMap<OptimizelyDecisionContext, OptimizelyForcedDecision>,
}

impl ForcedDecisions {
    #[allow(missing_docs)]
    pub fn set(&mut self, context: OptimizelyDecisionContext, decision: OptimizelyForcedDecision) {
        self.decisions.insert(context, decision);
    }

    #[allow(missing_docs)]
    pub fn get(&self, context: &OptimizelyDecisionContext) -> Option<&OptimizelyForcedDecision> {
        self.decisions.get(context)
    }

    /// Returns `true` if the decision existed.
    pub fn remove(&mut self, context: &OptimizelyDecisionContext) -> bool {
        self.decisions.remove(context).is_some()
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.decisions.clear();
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Find forced variation for flag (and rule) that exists in the datafile.
    ///
    /// A forced variation key unknown to the flag is reported and ignored.
    pub(crate) fn find_validated<'a>(
        &self,
        config: &'a ProjectConfig,
        flag_key: &str,
        rule_key: Option<&str>,
        user_id: &str,
        reasons: &mut DecisionReasons,
    ) -> Option<&'a Variation> {
        if self.decisions.is_empty() {
            return None;
        }

        let context = OptimizelyDecisionContext {
            flag_key: flag_key.to_owned(),
            rule_key: rule_key.map(str::to_owned),
        };
        let forced = self.decisions.get(&context)?;
        let target = match rule_key {
            Some(rule_key) => format!("flag ({flag_key}), rule ({rule_key})"),
            None => format!("flag ({flag_key})"),
        };

        match config.flag_variation_by_key(flag_key, &forced.variation_key) {
            Some(variation) => {
                reasons.add_info(format!(
                    "Variation ({}) is mapped to {target} and user ({user_id}) in the forced \
                     decision map.",
                    forced.variation_key
                ));
                Some(variation)
            }
            None => {
                reasons.add_info(format!(
                    "Invalid variation is mapped to {target} and user ({user_id}) in the \
                     forced decision map."
                ));
                None
            }
        }
    }
}
