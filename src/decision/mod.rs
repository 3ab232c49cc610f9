//! Decision pipeline.
//!
//! The decision service answers two questions: which variation of an experiment a user gets and
//! how a feature resolves for a user. Both answers are deterministic for a given project config
//! and bucketing id.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    cmab::CmabService,
    entities::{Experiment, Variable, Variation},
};

mod experiment_service;
mod feature_service;
mod forced_decisions;
mod options;
mod overrides;
mod reasons;
mod user_profile;

pub use forced_decisions::{ForcedDecisions, OptimizelyDecisionContext, OptimizelyForcedDecision};
pub use options::{DecideOption, DecideOptions};
pub use overrides::{ExperimentOverrideKey, ExperimentOverrideStore, MapExperimentOverridesStore};
pub use reasons::DecisionReason;
pub use user_profile::{InMemoryUserProfileService, UserProfile, UserProfileService};

pub(crate) use reasons::DecisionReasons;

/// Where a decision came from. Reported as the rule type of impressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    /// Direct experiment activation.
    Experiment,
    /// An experiment backing a feature.
    FeatureTest,
    /// A rollout rule.
    Rollout,
}

impl DecisionSource {
    /// Rule type as reported in events and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Experiment => "experiment",
            DecisionSource::FeatureTest => "feature-test",
            DecisionSource::Rollout => "rollout",
        }
    }
}

/// Variation of an experiment assigned to a user.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentDecision<'a> {
    /// `None` if the user is not in the experiment.
    pub variation: Option<&'a Variation>,
    #[allow(missing_docs)]
    pub reason: DecisionReason,
    /// Set when the variation was assigned by the CMAB predictor.
    pub cmab_uuid: Option<String>,
}

impl<'a> ExperimentDecision<'a> {
    fn none(reason: DecisionReason) -> Self {
        ExperimentDecision {
            variation: None,
            reason,
            cmab_uuid: None,
        }
    }

    fn found(variation: &'a Variation, reason: DecisionReason) -> Self {
        ExperimentDecision {
            variation: Some(variation),
            reason,
            cmab_uuid: None,
        }
    }
}

/// Resolution of a feature for a user.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureDecision<'a> {
    /// Experiment or rollout rule that produced the variation.
    pub experiment: Option<&'a Experiment>,
    /// `None` if no rule applied.
    pub variation: Option<&'a Variation>,
    #[allow(missing_docs)]
    pub source: DecisionSource,
    #[allow(missing_docs)]
    pub reason: DecisionReason,
    /// Set when the variation was assigned by the CMAB predictor.
    pub cmab_uuid: Option<String>,
}

impl<'a> FeatureDecision<'a> {
    /// `true` if the feature is enabled for the user.
    pub fn enabled(&self) -> bool {
        self.variation.is_some_and(|v| v.feature_enabled)
    }

    /// Raw value of `variable` under this decision.
    ///
    /// Variation overrides apply only when the feature is enabled. Otherwise the default value is
    /// returned.
    pub fn variable_value<'b>(&'b self, variable: &'b Variable) -> &'b str {
        match self.variation {
            Some(variation) if variation.feature_enabled => variation
                .variables
                .get(&variable.id)
                .map(String::as_str)
                .unwrap_or(&variable.default_value),
            _ => &variable.default_value,
        }
    }
}

/// Runs the decision pipeline.
#[derive(Clone)]
pub(crate) struct DecisionService {
    overrides: Arc<dyn ExperimentOverrideStore>,
    user_profile_service: Option<Arc<dyn UserProfileService>>,
    cmab_service: Option<Arc<dyn CmabService>>,
}

impl DecisionService {
    /// Create a decision service consulting `overrides` for runtime forced variations.
    pub fn new(overrides: Arc<dyn ExperimentOverrideStore>) -> DecisionService {
        DecisionService {
            overrides,
            user_profile_service: None,
            cmab_service: None,
        }
    }

    /// Enable sticky bucketing.
    pub fn with_user_profile_service(
        mut self,
        user_profile_service: Arc<dyn UserProfileService>,
    ) -> DecisionService {
        self.user_profile_service = Some(user_profile_service);
        self
    }

    /// Enable CMAB experiments. Without a CMAB service, CMAB experiments fail to decide.
    pub fn with_cmab_service(mut self, cmab_service: Arc<dyn CmabService>) -> DecisionService {
        self.cmab_service = Some(cmab_service);
        self
    }
}
