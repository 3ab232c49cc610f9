//! Client facade over config managers, the decision pipeline, and event processing.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde_json::json;

use crate::{
    cmab::CmabService,
    config::{
        PollingConfig, PollingProjectConfigManager, ProjectConfigManager,
        StaticProjectConfigManager,
    },
    datafile::ProjectConfig,
    decision::{
        DecideOptions, DecisionReasons, DecisionService, DecisionSource, ExperimentDecision,
        ExperimentOverrideKey, ExperimentOverrideStore, FeatureDecision, ForcedDecisions,
        MapExperimentOverridesStore,
    },
    entities::{Experiment, Feature, Variable, VariableType},
    events::{
        create_conversion_event, create_impression_event, BatchEventProcessor, EventProcessor,
        EventTags, HttpEventDispatcher, UserEvent,
    },
    execution::ExecutionContext,
    notification::{
        DecisionNotification, DecisionNotificationType, Notification, NotificationCenter,
        TrackNotification,
    },
    user_context::UserContext,
    Attributes, Error, Result,
};

mod config;
mod decision;
mod user_context;
mod variable;

pub use config::ClientConfig;
pub use decision::Decision;
pub use user_context::OptimizelyUserContext;
pub use variable::VariableValue;

/// A client for Optimizely Feature Experimentation.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// The client is cheap to clone: clones share config, background workers, and notification
/// handlers. Call [`Client::close`] to flush pending events and stop background workers.
///
/// Evaluation methods return `Result`. In production, it is recommended to fall back to a safe
/// default (e.g., `client.is_feature_enabled(..).unwrap_or(false)`) rather than propagate errors.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config_manager: Arc<dyn ProjectConfigManager>,
    decision_service: DecisionService,
    overrides: Arc<MapExperimentOverridesStore>,
    event_processor: Arc<dyn EventProcessor>,
    notification_center: Arc<NotificationCenter>,
    default_decide_options: DecideOptions,
    execution: ExecutionContext,
    closed: AtomicBool,
}

impl Client {
    /// Create a new `Client` using the specified configuration. Same as
    /// [`ClientConfig::to_client`].
    pub fn new(config: ClientConfig) -> Result<Client> {
        let notification_center = Arc::new(NotificationCenter::new());
        let execution = ExecutionContext::new();

        let config_manager: Arc<dyn ProjectConfigManager> =
            match (config.config_manager, config.sdk_key) {
                (Some(manager), _) => manager,
                (None, Some(sdk_key)) => {
                    let mut polling = PollingConfig::new(sdk_key)
                        .with_datafile_url_template(config.datafile_url_template)
                        .with_polling_interval(config.polling_interval)
                        .with_jitter(config.polling_jitter)
                        .with_requester(config.requester);
                    if let Some(datafile) = config.datafile {
                        polling = polling.with_initial_datafile(datafile);
                    }
                    Arc::new(PollingProjectConfigManager::start(
                        polling,
                        notification_center.clone(),
                        &execution,
                    )?)
                }
                (None, None) => match config.datafile {
                    Some(datafile) => {
                        Arc::new(StaticProjectConfigManager::from_datafile(&datafile)?)
                    }
                    None => {
                        return Err(Error::InvalidArgument(
                            "an SDK key, a datafile, or a config manager is required".to_owned(),
                        ))
                    }
                },
            };

        let event_processor: Arc<dyn EventProcessor> = match config.event_processor {
            Some(processor) => processor,
            None => {
                let dispatcher = match config.event_dispatcher {
                    Some(dispatcher) => dispatcher,
                    None => Arc::new(HttpEventDispatcher::new(
                        HttpEventDispatcher::DEFAULT_TIMEOUT,
                    )?),
                };
                Arc::new(BatchEventProcessor::start(
                    config.event_processor_config,
                    dispatcher,
                    notification_center.clone(),
                    &execution,
                )?)
            }
        };

        let cmab_service: Arc<dyn CmabService> = match config.cmab_service {
            Some(service) => service,
            None => Arc::new(config.cmab_config.to_service(&execution)?),
        };

        let overrides = Arc::new(MapExperimentOverridesStore::new());
        let mut decision_service =
            DecisionService::new(overrides.clone()).with_cmab_service(cmab_service);
        if let Some(user_profile_service) = config.user_profile_service {
            decision_service = decision_service.with_user_profile_service(user_profile_service);
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                config_manager,
                decision_service,
                overrides,
                event_processor,
                notification_center,
                default_decide_options: config.default_decide_options,
                execution,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Return the currently published project config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if no config has been fetched yet.
    pub fn get_project_config(&self) -> Result<Arc<ProjectConfig>> {
        self.inner.config_manager.get_config()
    }

    /// Block until the first project config is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the config manager failed unrecoverably (e.g., the SDK key is not
    /// authorized) or the client was closed first.
    pub fn wait_for_configuration(&self) -> Result<()> {
        self.inner.config_manager.wait_for_configuration()
    }

    /// Notification center of this client. Register handlers here.
    pub fn notification_center(&self) -> &NotificationCenter {
        &self.inner.notification_center
    }

    /// Create a user context to make decisions for.
    pub fn create_user_context(
        &self,
        user_id: impl Into<String>,
        attributes: Attributes,
    ) -> OptimizelyUserContext {
        OptimizelyUserContext::new(self.clone(), UserContext::new(user_id, attributes))
    }

    /// Return `true` if `feature_key` is enabled for `user`.
    ///
    /// Sends an impression if the user was bucketed into a feature test (or into any rule, if
    /// the datafile asks for flag decisions).
    ///
    /// # Errors
    ///
    /// Returns an error if no config is available, the user id is empty, the feature does not
    /// exist, or the feature backs a CMAB experiment whose decision could not be fetched.
    pub fn is_feature_enabled(&self, feature_key: &str, user: &UserContext) -> Result<bool> {
        let config = self.get_project_config()?;
        validate_user(user)?;
        let feature = config.feature(feature_key)?;
        self.feature_enabled(&config, feature, user)
    }

    /// Return keys of features enabled for `user`, in datafile order.
    ///
    /// Features failing to evaluate are logged and skipped.
    pub fn get_enabled_features(&self, user: &UserContext) -> Result<Vec<String>> {
        let config = self.get_project_config()?;
        validate_user(user)?;

        let mut enabled = Vec::new();
        for feature in config.features() {
            match self.feature_enabled(&config, feature, user) {
                Ok(true) => enabled.push(feature.key.to_string()),
                Ok(false) => {}
                Err(err) => {
                    log::warn!(target: "optimizely", feature_key = feature.key,
                               user_id = user.id.as_str();
                               "failed to evaluate feature: {err}");
                }
            }
        }
        Ok(enabled)
    }

    fn feature_enabled(
        &self,
        config: &ProjectConfig,
        feature: &Feature,
        user: &UserContext,
    ) -> Result<bool> {
        let decision = self.feature_decision(config, feature, user)?;
        let enabled = decision.enabled();

        if should_send_impression(config, &decision) {
            self.send_event(create_impression_event(config, &decision, &feature.key, user));
        }

        log::trace!(target: "optimizely", feature_key = feature.key, user_id = user.id.as_str(),
                    enabled; "evaluated feature");
        self.send_decision_notification(
            DecisionNotificationType::Feature,
            user,
            json!({
                "featureKey": feature.key,
                "featureEnabled": enabled,
                "source": decision.source.as_str(),
                "sourceInfo": source_info(&decision),
            }),
        );
        Ok(enabled)
    }

    /// Return value of a feature variable, coerced to its declared type.
    ///
    /// If the feature is disabled for the user, or the decided value does not fit the declared
    /// type, the variable's default value is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAttributeValueType`] only if the default value does not fit the
    /// declared type either.
    pub fn get_feature_variable(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<VariableValue> {
        self.feature_variable(feature_key, variable_key, user, None)
    }

    /// Return value of a boolean feature variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VariableTypeMismatch`] if the variable is not a boolean, plus any error of
    /// [`Client::get_feature_variable`].
    pub fn get_feature_variable_boolean(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<bool> {
        match self.feature_variable(feature_key, variable_key, user, Some(VariableType::Boolean))? {
            VariableValue::Boolean(value) => Ok(value),
            other => Err(type_mismatch(VariableType::Boolean, &other)),
        }
    }

    /// Return value of an integer feature variable.
    pub fn get_feature_variable_integer(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<i64> {
        match self.feature_variable(feature_key, variable_key, user, Some(VariableType::Integer))? {
            VariableValue::Integer(value) => Ok(value),
            other => Err(type_mismatch(VariableType::Integer, &other)),
        }
    }

    /// Return value of a double feature variable.
    pub fn get_feature_variable_double(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<f64> {
        match self.feature_variable(feature_key, variable_key, user, Some(VariableType::Double))? {
            VariableValue::Double(value) => Ok(value),
            other => Err(type_mismatch(VariableType::Double, &other)),
        }
    }

    /// Return value of a string feature variable.
    pub fn get_feature_variable_string(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<String> {
        match self.feature_variable(feature_key, variable_key, user, Some(VariableType::String))? {
            VariableValue::String(value) => Ok(value),
            other => Err(type_mismatch(VariableType::String, &other)),
        }
    }

    /// Return value of a JSON feature variable.
    pub fn get_feature_variable_json(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
    ) -> Result<serde_json::Value> {
        match self.feature_variable(feature_key, variable_key, user, Some(VariableType::Json))? {
            VariableValue::Json(value) => Ok(value),
            other => Err(type_mismatch(VariableType::Json, &other)),
        }
    }

    fn feature_variable(
        &self,
        feature_key: &str,
        variable_key: &str,
        user: &UserContext,
        expected: Option<VariableType>,
    ) -> Result<VariableValue> {
        let config = self.get_project_config()?;
        validate_user(user)?;
        let feature = config.feature(feature_key)?;
        let variable = config.variable(feature_key, variable_key)?;
        if let Some(expected) = expected.filter(|&expected| expected != variable.variable_type) {
            return Err(Error::VariableTypeMismatch {
                expected,
                found: variable.variable_type,
            });
        }

        let decision = self.feature_decision(&config, feature, user)?;
        let value = resolve_variable(&decision, variable, &mut DecisionReasons::new(false))?;

        self.send_decision_notification(
            DecisionNotificationType::FeatureVariable,
            user,
            json!({
                "featureKey": feature_key,
                "featureEnabled": decision.enabled(),
                "source": decision.source.as_str(),
                "variableKey": variable_key,
                "variableType": variable.variable_type,
                "variableValue": value.to_json(),
                "sourceInfo": source_info(&decision),
            }),
        );
        Ok(value)
    }

    /// Return values of all variables of a feature, keyed by variable key.
    ///
    /// Values that cannot be coerced to the declared type fall back to the default. Variables
    /// whose default cannot be coerced either are logged and left out.
    pub fn get_all_feature_variables(
        &self,
        feature_key: &str,
        user: &UserContext,
    ) -> Result<serde_json::Map<String, serde_json::Value>> {
        let config = self.get_project_config()?;
        validate_user(user)?;
        let feature = config.feature(feature_key)?;
        let decision = self.feature_decision(&config, feature, user)?;

        let mut reasons = DecisionReasons::new(false);
        let variables = variables_json(feature, &decision, &mut reasons);

        self.send_decision_notification(
            DecisionNotificationType::AllFeatureVariables,
            user,
            json!({
                "featureKey": feature_key,
                "featureEnabled": decision.enabled(),
                "source": decision.source.as_str(),
                "variableValues": variables,
                "sourceInfo": source_info(&decision),
            }),
        );
        Ok(variables)
    }

    /// Activate experiment for `user`: decide the variation and send an impression.
    ///
    /// Returns `Ok(None)` if the user does not qualify for the experiment or is not bucketed
    /// into any variation.
    pub fn activate(&self, experiment_key: &str, user: &UserContext) -> Result<Option<String>> {
        self.experiment_variation(experiment_key, user, true)
    }

    /// Same as [`Client::activate`] but without sending an impression.
    pub fn get_variation(
        &self,
        experiment_key: &str,
        user: &UserContext,
    ) -> Result<Option<String>> {
        self.experiment_variation(experiment_key, user, false)
    }

    fn experiment_variation(
        &self,
        experiment_key: &str,
        user: &UserContext,
        send_impression: bool,
    ) -> Result<Option<String>> {
        let config = self.get_project_config()?;
        validate_user(user)?;
        let experiment = config.experiment_by_key(experiment_key)?;
        let decision = self.experiment_decision(&config, experiment, user)?;
        let variation_key = decision.variation.map(|variation| variation.key.to_string());

        if send_impression && decision.variation.is_some() {
            let impression = FeatureDecision {
                experiment: Some(experiment),
                variation: decision.variation,
                source: DecisionSource::Experiment,
                reason: decision.reason,
                cmab_uuid: decision.cmab_uuid,
            };
            self.send_event(create_impression_event(&config, &impression, "", user));
        }

        log::trace!(target: "optimizely", experiment_key, user_id = user.id.as_str(),
                    variation_key = variation_key.as_deref(); "evaluated experiment");
        self.send_decision_notification(
            DecisionNotificationType::AbTest,
            user,
            json!({
                "experimentKey": experiment_key,
                "variationKey": variation_key,
            }),
        );
        Ok(variation_key)
    }

    /// Track a conversion of `event_key` for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EventNotFound`] if the event is not in the datafile, and
    /// [`Error::ClientClosed`] after [`Client::close`]. Nothing is sent in either case.
    pub fn track(&self, event_key: &str, user: &UserContext, tags: EventTags) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }
        let config = self.get_project_config()?;
        validate_user(user)?;

        let event = create_conversion_event(&config, event_key, user, tags.clone())?;
        self.send_event(event.clone());

        self.inner
            .notification_center
            .send(&Notification::Track(TrackNotification {
                event_key: event_key.to_owned(),
                user_id: user.id.clone(),
                attributes: user.attributes.clone(),
                event_tags: tags,
                conversion_event: event,
            }));
        Ok(())
    }

    /// Force `user_id` into `variation_key` of `experiment_key`, overriding bucketing.
    ///
    /// # Errors
    ///
    /// Returns an error if the experiment or variation does not exist in the current datafile.
    pub fn set_forced_variation(
        &self,
        experiment_key: &str,
        user_id: &str,
        variation_key: &str,
    ) -> Result<()> {
        let config = self.get_project_config()?;
        let experiment = config.experiment_by_key(experiment_key)?;
        if experiment.variation_by_key(variation_key).is_none() {
            return Err(Error::VariationNotFound {
                experiment_key: experiment_key.to_owned(),
                variation_key: variation_key.to_owned(),
            });
        }
        self.inner.overrides.set_variation(
            ExperimentOverrideKey::new(experiment_key, user_id),
            variation_key,
        );
        Ok(())
    }

    /// Return variation key forced with [`Client::set_forced_variation`].
    pub fn get_forced_variation(&self, experiment_key: &str, user_id: &str) -> Option<String> {
        self.inner
            .overrides
            .get_variation(&ExperimentOverrideKey::new(experiment_key, user_id))
    }

    /// Remove forced variation. Returns `false` if there was none.
    pub fn remove_forced_variation(&self, experiment_key: &str, user_id: &str) -> bool {
        self.inner
            .overrides
            .remove_variation(&ExperimentOverrideKey::new(experiment_key, user_id))
    }

    /// Stop background workers, flushing pending events. Blocks until the workers exit.
    ///
    /// Subsequent calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerPanicked`] if a background worker panicked.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::info!(target: "optimizely", "closing client");
        self.inner.execution.cancel();
        self.inner.execution.wait()
    }

    /// `true` after [`Client::close`].
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn decide(
        &self,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        flag_key: &str,
        options: &DecideOptions,
    ) -> Decision {
        let config = match self.get_project_config() {
            Ok(config) => config,
            Err(err) => {
                return Decision::error(flag_key, &user.id, &user.attributes, vec![err.to_string()])
            }
        };
        self.decide_flag(&config, user, forced_decisions, flag_key, options)
    }

    pub(crate) fn decide_for_keys<'k>(
        &self,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        keys: impl IntoIterator<Item = &'k str>,
        options: &DecideOptions,
    ) -> HashMap<String, Decision> {
        let config = match self.get_project_config() {
            Ok(config) => config,
            Err(err) => {
                log::warn!(target: "optimizely", user_id = user.id.as_str();
                           "cannot decide: {err}");
                return HashMap::new();
            }
        };

        keys.into_iter()
            .map(|key| self.decide_flag(&config, user, forced_decisions, key, options))
            .filter(|decision| !options.enabled_flags_only || decision.enabled)
            .map(|decision| (decision.flag_key.clone(), decision))
            .collect()
    }

    pub(crate) fn decide_all(
        &self,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        options: &DecideOptions,
    ) -> HashMap<String, Decision> {
        let keys = match self.get_project_config() {
            Ok(config) => config
                .features()
                .iter()
                .map(|feature| feature.key.to_string())
                .collect::<Vec<_>>(),
            Err(err) => {
                log::warn!(target: "optimizely", user_id = user.id.as_str();
                           "cannot decide: {err}");
                return HashMap::new();
            }
        };
        self.decide_for_keys(user, forced_decisions, keys.iter().map(String::as_str), options)
    }

    pub(crate) fn default_decide_options(&self) -> DecideOptions {
        self.inner.default_decide_options
    }

    fn decide_flag(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        forced_decisions: &ForcedDecisions,
        flag_key: &str,
        options: &DecideOptions,
    ) -> Decision {
        let Ok(feature) = config.feature(flag_key) else {
            return Decision::error(
                flag_key,
                &user.id,
                &user.attributes,
                vec![format!("No flag was found for key \"{flag_key}\".")],
            );
        };

        let mut reasons = DecisionReasons::new(options.include_reasons);
        let decision = match self.inner.decision_service.get_feature_decision(
            config,
            feature,
            user,
            forced_decisions,
            options,
            &mut reasons,
        ) {
            Ok(decision) => decision,
            Err(err) => {
                log::warn!(target: "optimizely", flag_key, user_id = user.id.as_str();
                           "decision failed: {err}");
                return Decision::error(
                    flag_key,
                    &user.id,
                    &user.attributes,
                    reasons.into_messages(),
                );
            }
        };

        let enabled = decision.enabled();
        let variables = if options.exclude_variables {
            serde_json::Map::new()
        } else {
            variables_json(feature, &decision, &mut reasons)
        };

        let mut decision_event_dispatched = false;
        if !options.disable_decision_event && should_send_impression(config, &decision) {
            decision_event_dispatched =
                self.send_event(create_impression_event(config, &decision, flag_key, user));
        }

        let variation_key = decision.variation.map(|variation| variation.key.to_string());
        let rule_key = decision.experiment.map(|experiment| experiment.key.to_string());
        let reasons = reasons.into_messages();

        log::trace!(target: "optimizely", flag_key, user_id = user.id.as_str(), enabled,
                    variation_key = variation_key.as_deref(); "decided flag");
        self.send_decision_notification(
            DecisionNotificationType::Flag,
            user,
            json!({
                "flagKey": flag_key,
                "enabled": enabled,
                "variables": variables,
                "variationKey": variation_key,
                "ruleKey": rule_key,
                "reasons": reasons,
                "decisionEventDispatched": decision_event_dispatched,
            }),
        );

        Decision {
            variation_key,
            enabled,
            variables,
            rule_key,
            flag_key: flag_key.to_owned(),
            user_id: user.id.clone(),
            attributes: user.attributes.clone(),
            reasons,
        }
    }

    fn feature_decision<'a>(
        &self,
        config: &'a ProjectConfig,
        feature: &'a Feature,
        user: &UserContext,
    ) -> Result<FeatureDecision<'a>> {
        let mut reasons = DecisionReasons::new(false);
        self.inner.decision_service.get_feature_decision(
            config,
            feature,
            user,
            &ForcedDecisions::default(),
            &DecideOptions::default(),
            &mut reasons,
        )
    }

    fn experiment_decision<'a>(
        &self,
        config: &'a ProjectConfig,
        experiment: &'a Experiment,
        user: &UserContext,
    ) -> Result<ExperimentDecision<'a>> {
        let mut reasons = DecisionReasons::new(false);
        self.inner.decision_service.get_variation(
            config,
            experiment,
            user,
            &DecideOptions::default(),
            &mut reasons,
        )
    }

    /// Hand `event` to the event processor. Returns `false` if it was dropped.
    fn send_event(&self, event: UserEvent) -> bool {
        if self.is_closed() {
            log::warn!(target: "optimizely", visitor_id = event.visitor_id.as_str();
                       "client is closed, dropping event");
            return false;
        }
        self.inner.event_processor.process(event)
    }

    fn send_decision_notification(
        &self,
        decision_type: DecisionNotificationType,
        user: &UserContext,
        decision_info: serde_json::Value,
    ) {
        self.inner
            .notification_center
            .send(&Notification::Decision(DecisionNotification {
                decision_type,
                user_id: user.id.clone(),
                attributes: user.attributes.clone(),
                decision_info,
            }));
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

fn validate_user(user: &UserContext) -> Result<()> {
    if user.id.is_empty() {
        return Err(Error::InvalidArgument("user id must not be empty".to_owned()));
    }
    Ok(())
}

fn type_mismatch(expected: VariableType, found: &VariableValue) -> Error {
    Error::VariableTypeMismatch {
        expected,
        found: found.variable_type(),
    }
}

/// Impressions are sent for feature tests and, if the datafile asks for flag decisions, for every
/// decision.
fn should_send_impression(config: &ProjectConfig, decision: &FeatureDecision) -> bool {
    config.send_flag_decisions()
        || (decision.source != DecisionSource::Rollout && decision.variation.is_some())
}

fn source_info(decision: &FeatureDecision) -> serde_json::Value {
    match (decision.source, decision.experiment, decision.variation) {
        (DecisionSource::FeatureTest, Some(experiment), Some(variation)) => json!({
            "experimentKey": experiment.key,
            "variationKey": variation.key,
        }),
        _ => json!({}),
    }
}

fn variables_json(
    feature: &Feature,
    decision: &FeatureDecision,
    reasons: &mut DecisionReasons,
) -> serde_json::Map<String, serde_json::Value> {
    let mut variables = serde_json::Map::new();
    for variable in &feature.variables {
        if let Ok(value) = resolve_variable(decision, variable, reasons) {
            variables.insert(variable.key.to_string(), value.into_json());
        }
    }
    variables
}

/// Coerce the decided value of `variable` to its declared type. A value that does not fit falls
/// back to the variable's default.
fn resolve_variable(
    decision: &FeatureDecision,
    variable: &Variable,
    reasons: &mut DecisionReasons,
) -> Result<VariableValue> {
    let raw = decision.variable_value(variable);
    let err = match VariableValue::parse(raw, variable.variable_type) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    reasons.add_error(format!(
        "Variable value for key \"{}\" is invalid or wrong type: {err}",
        variable.key
    ));

    if raw == variable.default_value {
        log::warn!(target: "optimizely", variable_key = variable.key;
                   "invalid default variable value: {err}");
        return Err(err);
    }
    log::warn!(target: "optimizely", variable_key = variable.key;
               "invalid variable value, using default: {err}");
    VariableValue::parse(&variable.default_value, variable.variable_type).inspect_err(|err| {
        log::warn!(target: "optimizely", variable_key = variable.key;
                   "invalid default variable value: {err}");
    })
}

#[cfg(test)]
mod tests;
