use crate::{
    audience::evaluate_experiment_audiences,
    bucketer,
    entities::{Experiment, GroupPolicy, Range},
    user_context::UserContext,
    Error, ProjectConfig, Result,
};

use super::{
    DecideOptions, DecisionReason, DecisionReasons, DecisionService, ExperimentDecision,
    ExperimentOverrideKey, UserProfile,
};

/// Entity id of the synthetic range gating CMAB traffic.
const CMAB_TRAFFIC_ENTITY_ID: &str = "$";

impl DecisionService {
    /// Decide which variation of `experiment` the user gets.
    ///
    /// Order: runtime forced variation, whitelist, user profile, audiences, group, then CMAB
    /// predictor or traffic bucketing. Fails only if a CMAB decision cannot be fetched.
    pub fn get_variation<'a>(
        &self,
        config: &'a ProjectConfig,
        experiment: &'a Experiment,
        user: &UserContext,
        options: &DecideOptions,
        reasons: &mut DecisionReasons,
    ) -> Result<ExperimentDecision<'a>> {
        if !experiment.status.is_active() {
            reasons.add_info(format!("Experiment \"{}\" is not running.", experiment.key));
            return Ok(ExperimentDecision::none(DecisionReason::ExperimentNotRunning));
        }

        if let Some(decision) = self.forced_variation(experiment, user, reasons) {
            return Ok(decision);
        }

        if let Some(decision) = whitelisted_variation(experiment, user, reasons) {
            return Ok(decision);
        }

        let user_profile_service = self
            .user_profile_service
            .as_ref()
            .filter(|_| !options.ignore_user_profile_service && experiment.cmab.is_none());
        let profile = user_profile_service.and_then(|service| service.lookup(&user.id));
        if let Some(profile) = &profile {
            if let Some(decision) = saved_variation(experiment, profile, reasons) {
                return Ok(decision);
            }
        }

        if evaluate_experiment_audiences(config, experiment, user) != Some(true) {
            reasons.add_info(format!(
                "User \"{}\" does not meet conditions to be in experiment \"{}\".",
                user.id, experiment.key
            ));
            return Ok(ExperimentDecision::none(DecisionReason::DoesNotQualify));
        }

        let bucketing_id = user.bucketing_id();
        if !is_in_group_experiment(config, experiment, bucketing_id, &user.id, reasons) {
            return Ok(ExperimentDecision::none(
                DecisionReason::NotBucketedIntoVariation,
            ));
        }

        if experiment.cmab.is_some() {
            return self.cmab_variation(config, experiment, user, options, reasons);
        }

        let decision = bucket_into_variation(experiment, bucketing_id, &user.id, reasons);

        if let (Some(service), Some(variation)) = (user_profile_service, decision.variation) {
            let mut profile = profile.unwrap_or_else(|| UserProfile::new(user.id.as_str()));
            profile
                .experiment_bucket_map
                .insert(experiment.id.to_string(), variation.id.to_string());
            if let Err(err) = service.save(profile) {
                log::warn!(target: "optimizely", user_id = user.id.as_str();
                           "failed to save user profile: {err}");
            }
        }

        Ok(decision)
    }

    fn forced_variation<'a>(
        &self,
        experiment: &'a Experiment,
        user: &UserContext,
        reasons: &mut DecisionReasons,
    ) -> Option<ExperimentDecision<'a>> {
        let key = ExperimentOverrideKey::new(experiment.key.as_str(), user.id.as_str());
        let variation_key = self.overrides.get_variation(&key)?;

        match experiment.variation_by_key(&variation_key) {
            Some(variation) => {
                reasons.add_info(format!(
                    "Variation \"{variation_key}\" is forced for user \"{}\" in experiment \"{}\".",
                    user.id, experiment.key
                ));
                Some(ExperimentDecision::found(
                    variation,
                    DecisionReason::ForcedVariationFound,
                ))
            }
            None => {
                reasons.add_info(format!(
                    "{}: variation \"{variation_key}\" does not exist in experiment \"{}\".",
                    DecisionReason::InvalidForcedVariationAssignment,
                    experiment.key
                ));
                None
            }
        }
    }

    fn cmab_variation<'a>(
        &self,
        config: &'a ProjectConfig,
        experiment: &'a Experiment,
        user: &UserContext,
        options: &DecideOptions,
        reasons: &mut DecisionReasons,
    ) -> Result<ExperimentDecision<'a>> {
        let traffic_allocation = experiment
            .cmab
            .as_ref()
            .map(|cmab| cmab.traffic_allocation)
            .unwrap_or_default();
        let gate = [Range {
            entity_id: CMAB_TRAFFIC_ENTITY_ID.into(),
            end_of_range: traffic_allocation,
        }];
        let key = format!("{}{}", user.bucketing_id(), experiment.id);
        if bucketer::bucket_to_entity(&key, &gate).is_none() {
            reasons.add_info(format!(
                "User \"{}\" is not in CMAB traffic of experiment \"{}\".",
                user.id, experiment.key
            ));
            return Ok(ExperimentDecision::none(
                DecisionReason::NotBucketedIntoVariation,
            ));
        }

        let fetch_failed = |reasons: &mut DecisionReasons| {
            reasons.add_error(format!(
                "{} for experiment \"{}\".",
                DecisionReason::CmabFetchFailed,
                experiment.key
            ));
            Error::CmabFetchFailed {
                rule_key: experiment.key.to_string(),
            }
        };

        let Some(cmab_service) = &self.cmab_service else {
            log::warn!(target: "optimizely", experiment_key = experiment.key;
                       "no CMAB service configured");
            return Err(fetch_failed(reasons));
        };
        let cmab_decision = match cmab_service.get_decision(config, user, &experiment.id, options) {
            Ok(decision) => decision,
            Err(err) => {
                log::warn!(target: "optimizely", experiment_key = experiment.key;
                           "CMAB decision failed: {err}");
                return Err(fetch_failed(reasons));
            }
        };

        match experiment.variation_by_id(&cmab_decision.variation_id) {
            Some(variation) => {
                reasons.add_info(format!(
                    "User \"{}\" is in variation \"{}\" of experiment \"{}\" by CMAB.",
                    user.id, variation.key, experiment.key
                ));
                Ok(ExperimentDecision {
                    variation: Some(variation),
                    reason: DecisionReason::BucketedIntoVariation,
                    cmab_uuid: Some(cmab_decision.cmab_uuid),
                })
            }
            None => {
                reasons.add_error(format!(
                    "{}: CMAB returned unknown variation \"{}\" for experiment \"{}\".",
                    DecisionReason::BucketedVariationNotFound,
                    cmab_decision.variation_id,
                    experiment.key
                ));
                Ok(ExperimentDecision::none(
                    DecisionReason::BucketedVariationNotFound,
                ))
            }
        }
    }
}

fn whitelisted_variation<'a>(
    experiment: &'a Experiment,
    user: &UserContext,
    reasons: &mut DecisionReasons,
) -> Option<ExperimentDecision<'a>> {
    let Some(variation_key) = experiment.forced_variations.get(&user.id) else {
        log::trace!(target: "optimizely",
                    user_id = user.id.as_str(), experiment_key = experiment.key;
                    "{}", DecisionReason::NoWhitelistVariationAssignment);
        return None;
    };

    match experiment.variation_by_key(variation_key) {
        Some(variation) => {
            reasons.add_info(format!(
                "User \"{}\" is forced in variation \"{variation_key}\" of experiment \"{}\".",
                user.id, experiment.key
            ));
            Some(ExperimentDecision::found(
                variation,
                DecisionReason::WhitelistVariationAssignmentFound,
            ))
        }
        None => {
            log::warn!(target: "optimizely",
                       user_id = user.id.as_str(), experiment_key = experiment.key;
                       "whitelisted variation {variation_key} does not exist");
            reasons.add_info(format!(
                "{}: variation \"{variation_key}\" for user \"{}\" is not in experiment \"{}\".",
                DecisionReason::InvalidWhitelistVariationAssignment,
                user.id,
                experiment.key
            ));
            None
        }
    }
}

fn saved_variation<'a>(
    experiment: &'a Experiment,
    profile: &UserProfile,
    reasons: &mut DecisionReasons,
) -> Option<ExperimentDecision<'a>> {
    let variation_id = profile.variation_for_experiment(&experiment.id)?;
    match experiment.variation_by_id(variation_id) {
        Some(variation) => {
            reasons.add_info(format!(
                "User \"{}\" was previously bucketed into variation \"{}\" of experiment \"{}\".",
                profile.user_id, variation.key, experiment.key
            ));
            Some(ExperimentDecision::found(
                variation,
                DecisionReason::UserProfileVariationFound,
            ))
        }
        None => {
            reasons.add_info(format!(
                "Saved variation \"{variation_id}\" of user \"{}\" no longer exists in \
                 experiment \"{}\".",
                profile.user_id, experiment.key
            ));
            None
        }
    }
}

/// Check mutual exclusion. Only groups with `random` policy exclude users.
fn is_in_group_experiment(
    config: &ProjectConfig,
    experiment: &Experiment,
    bucketing_id: &str,
    user_id: &str,
    reasons: &mut DecisionReasons,
) -> bool {
    let Some(group_id) = &experiment.group_id else {
        return true;
    };
    let Some(group) = config.group(group_id) else {
        log::warn!(target: "optimizely", experiment_key = experiment.key, group_id;
                   "experiment references unknown group");
        return true;
    };
    if group.policy != GroupPolicy::Random {
        return true;
    }

    let key = format!("{bucketing_id}{group_id}");
    match bucketer::bucket_to_entity(&key, &group.traffic_allocation) {
        Some(experiment_id) if *experiment_id == experiment.id => {
            reasons.add_info(format!(
                "User \"{user_id}\" is in experiment \"{}\" of group \"{group_id}\".",
                experiment.key
            ));
            true
        }
        _ => {
            reasons.add_info(format!(
                "{}: user \"{user_id}\" is not in experiment \"{}\" of group \"{group_id}\".",
                DecisionReason::NotInGroup,
                experiment.key
            ));
            false
        }
    }
}

/// Bucket the user into a variation using the experiment's traffic allocation.
pub(super) fn bucket_into_variation<'a>(
    experiment: &'a Experiment,
    bucketing_id: &str,
    user_id: &str,
    reasons: &mut DecisionReasons,
) -> ExperimentDecision<'a> {
    let key = format!("{bucketing_id}{}", experiment.id);
    let Some(variation_id) = bucketer::bucket_to_entity(&key, &experiment.traffic_allocation)
    else {
        reasons.add_info(format!(
            "User \"{user_id}\" is not in any variation of experiment \"{}\".",
            experiment.key
        ));
        return ExperimentDecision::none(DecisionReason::NotBucketedIntoVariation);
    };

    match experiment.variation_by_id(variation_id) {
        Some(variation) => {
            reasons.add_info(format!(
                "User \"{user_id}\" is in variation \"{}\" of experiment \"{}\".",
                variation.key, experiment.key
            ));
            ExperimentDecision::found(variation, DecisionReason::BucketedIntoVariation)
        }
        None => {
            log::warn!(target: "optimizely", experiment_key = experiment.key, variation_id;
                       "bucketed into unknown variation");
            reasons.add_info(format!(
                "{}: variation \"{variation_id}\" of experiment \"{}\".",
                DecisionReason::BucketedVariationNotFound,
                experiment.key
            ));
            ExperimentDecision::none(DecisionReason::BucketedVariationNotFound)
        }
    }
}
