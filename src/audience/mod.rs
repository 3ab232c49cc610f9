//! Audience conditions and their evaluation.
//!
//! Evaluation is three-valued: `Some(true)`, `Some(false)` or `None` for UNKNOWN. UNKNOWN is
//! produced by missing attributes, unsupported match types and values of unexpected types. Only a
//! definite `Some(true)` lets a user into an experiment.
mod condition_tree;
mod matchers;
mod semver;

pub use condition_tree::{
    Condition, ConditionParseError, ConditionTree, ConditionType, LogicalOperator,
};
pub use matchers::MatchType;

use crate::{entities::Experiment, user_context::UserContext, Audience, ProjectConfig};

impl Condition {
    /// Evaluate an attribute or segment condition for `user`.
    ///
    /// Audience leaves yield UNKNOWN here. They are resolved against the project config by
    /// [`evaluate_experiment_audiences`].
    pub fn evaluate(&self, user: &UserContext) -> Option<bool> {
        match self.condition_type {
            ConditionType::CustomAttribute | ConditionType::ThirdPartyDimension => {
                if self.match_type == MatchType::Qualified {
                    let segment = self.value.as_str()?;
                    return Some(user.is_qualified_for(segment));
                }
                if self.condition_type == ConditionType::ThirdPartyDimension {
                    return None;
                }
                self.match_type
                    .evaluate(user.attributes.get(&self.name), &self.value)
            }
            ConditionType::AudienceCondition | ConditionType::Unknown(_) => None,
        }
    }
}

impl Audience {
    /// Evaluate audience conditions for `user`.
    pub fn evaluate(&self, user: &UserContext) -> Option<bool> {
        let Some(tree) = &self.condition_tree else {
            log::warn!(target: "optimizely", audience_id = self.id;
                       "audience conditions could not be compiled");
            return None;
        };
        let result = tree.evaluate(&mut |condition| condition.evaluate(user));
        log::trace!(target: "optimizely", audience_id = self.id, user_id = user.id.as_str();
                    "audience evaluated to {result:?}");
        result
    }
}

/// Evaluate audience conditions of `experiment` for `user`.
///
/// Experiments without audience targeting admit everyone.
pub fn evaluate_experiment_audiences(
    config: &ProjectConfig,
    experiment: &Experiment,
    user: &UserContext,
) -> Option<bool> {
    let Some(tree) = &experiment.audience_conditions else {
        return Some(true);
    };

    tree.evaluate(&mut |condition| match condition.audience_id() {
        Some(audience_id) => match config.audience(audience_id) {
            Ok(audience) => audience.evaluate(user),
            Err(err) => {
                log::warn!(target: "optimizely", experiment_key = experiment.key;
                           "failed to evaluate audience: {err}");
                None
            }
        },
        None => condition.evaluate(user),
    })
}
