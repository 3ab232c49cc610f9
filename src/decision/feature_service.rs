use crate::{
    audience::evaluate_experiment_audiences,
    entities::{Experiment, Feature, Variation},
    user_context::UserContext,
    ProjectConfig, Result,
};

use super::{
    experiment_service::bucket_into_variation, DecideOptions, DecisionReason, DecisionReasons,
    DecisionService, DecisionSource, FeatureDecision, ForcedDecisions,
};

impl<'a> FeatureDecision<'a> {
    fn new(
        experiment: Option<&'a Experiment>,
        variation: Option<&'a Variation>,
        source: DecisionSource,
        reason: DecisionReason,
    ) -> Self {
        FeatureDecision {
            experiment,
            variation,
            source,
            reason,
            cmab_uuid: None,
        }
    }
}

impl DecisionService {
    /// Resolve `feature` for the user.
    ///
    /// Forced decisions come first, then feature tests in order, then the rollout. A feature that
    /// no rule applies to resolves to a decision without variation (disabled).
    ///
    /// Fails if a CMAB feature test cannot fetch its decision. Such a failure is not recovered by
    /// falling through to other rules.
    pub fn get_feature_decision<'a>(
        &self,
        config: &'a ProjectConfig,
        feature: &'a Feature,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        options: &DecideOptions,
        reasons: &mut DecisionReasons,
    ) -> Result<FeatureDecision<'a>> {
        if let Some(variation) =
            forced_decisions.find_validated(config, &feature.key, None, &user.id, reasons)
        {
            return Ok(FeatureDecision::new(
                None,
                Some(variation),
                DecisionSource::FeatureTest,
                DecisionReason::ForcedDecisionFound,
            ));
        }

        if let Some(decision) =
            self.feature_test_decision(config, feature, user, forced_decisions, options, reasons)?
        {
            return Ok(decision);
        }

        let decision = self.rollout_decision(config, feature, user, forced_decisions, reasons);
        log::trace!(target: "optimizely", feature_key = feature.key, user_id = user.id.as_str(),
                    enabled = decision.enabled(); "feature decision");
        Ok(decision)
    }

    fn feature_test_decision<'a>(
        &self,
        config: &'a ProjectConfig,
        feature: &'a Feature,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        options: &DecideOptions,
        reasons: &mut DecisionReasons,
    ) -> Result<Option<FeatureDecision<'a>>> {
        for experiment in config.feature_experiments(feature) {
            if let Some(variation) = forced_decisions.find_validated(
                config,
                &feature.key,
                Some(experiment.key.as_str()),
                &user.id,
                reasons,
            ) {
                return Ok(Some(FeatureDecision::new(
                    Some(experiment),
                    Some(variation),
                    DecisionSource::FeatureTest,
                    DecisionReason::ForcedDecisionFound,
                )));
            }

            let decision = self.get_variation(config, experiment, user, options, reasons)?;
            if let Some(variation) = decision.variation {
                reasons.add_info(format!(
                    "User \"{}\" is in variation \"{}\" of feature test \"{}\" of feature \"{}\".",
                    user.id, variation.key, experiment.key, feature.key
                ));
                return Ok(Some(FeatureDecision {
                    experiment: Some(experiment),
                    variation: Some(variation),
                    source: DecisionSource::FeatureTest,
                    reason: decision.reason,
                    cmab_uuid: decision.cmab_uuid,
                }));
            }
        }
        Ok(None)
    }

    /// Iterate rollout rules.
    ///
    /// A rule whose audience fails hands over to the next rule. A rule whose audience passes but
    /// whose traffic misses the user hands over to the last ("everyone else") rule. The last rule
    /// is evaluated without audience.
    fn rollout_decision<'a>(
        &self,
        config: &'a ProjectConfig,
        feature: &'a Feature,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        reasons: &mut DecisionReasons,
    ) -> FeatureDecision<'a> {
        let Some(rollout) = config.feature_rollout(feature) else {
            reasons.add_info(format!(
                "{}: feature \"{}\" has no rollout.",
                DecisionReason::NoRolloutForFeature,
                feature.key
            ));
            return FeatureDecision::new(
                None,
                None,
                DecisionSource::Rollout,
                DecisionReason::NoRolloutForFeature,
            );
        };
        let rules = &rollout.experiments;
        let Some(last) = rules.len().checked_sub(1) else {
            reasons.add_info(format!(
                "{}: rollout \"{}\" of feature \"{}\".",
                DecisionReason::RolloutHasNoExperiments,
                rollout.id,
                feature.key
            ));
            return FeatureDecision::new(
                None,
                None,
                DecisionSource::Rollout,
                DecisionReason::RolloutHasNoExperiments,
            );
        };

        let bucketing_id = user.bucketing_id();
        let mut reason = DecisionReason::FailedRolloutTargeting;
        let mut index = 0;
        while index <= last {
            let rule = &rules[index];
            let everyone_else = index == last;

            if let Some(variation) = forced_decisions.find_validated(
                config,
                &feature.key,
                Some(rule.key.as_str()),
                &user.id,
                reasons,
            ) {
                return FeatureDecision::new(
                    Some(rule),
                    Some(variation),
                    DecisionSource::Rollout,
                    DecisionReason::ForcedDecisionFound,
                );
            }

            if !everyone_else && evaluate_experiment_audiences(config, rule, user) != Some(true) {
                reasons.add_info(format!(
                    "{}: user \"{}\" does not meet conditions for targeting rule \"{}\".",
                    DecisionReason::DoesNotMeetRolloutTargeting,
                    user.id,
                    rule.key
                ));
                reason = DecisionReason::DoesNotMeetRolloutTargeting;
                index += 1;
                continue;
            }

            let decision = bucket_into_variation(rule, bucketing_id, &user.id, reasons);
            if let Some(variation) = decision.variation {
                reasons.add_info(format!(
                    "User \"{}\" is in rollout rule \"{}\" of feature \"{}\".",
                    user.id, rule.key, feature.key
                ));
                return FeatureDecision::new(
                    Some(rule),
                    Some(variation),
                    DecisionSource::Rollout,
                    decision.reason,
                );
            }

            if everyone_else {
                reason = decision.reason;
                break;
            }

            reasons.add_info(format!(
                "{}: user \"{}\" is not in traffic of targeting rule \"{}\", checking \
                 \"everyone else\".",
                DecisionReason::FailedRolloutTargeting,
                user.id,
                rule.key
            ));
            reason = DecisionReason::FailedRolloutTargeting;
            index = last;
        }

        reasons.add_info(format!(
            "User \"{}\" is not in any rollout rule of feature \"{}\".",
            user.id, feature.key
        ));
        FeatureDecision::new(None, None, DecisionSource::Rollout, reason)
    }
}
