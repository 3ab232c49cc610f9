use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::json;

use super::{resolve_variable, Client, ClientConfig};
use crate::{
    cmab::{CmabConfig, CmabDecision, CmabService},
    decision::{
        DecideOption, DecideOptions, DecisionReason, DecisionReasons, DecisionSource,
        FeatureDecision, InMemoryUserProfileService, OptimizelyDecisionContext,
        OptimizelyForcedDecision, UserProfileService,
    },
    entities::{Variable, VariableType},
    events::{
        BatchEventProcessorConfig, EventDispatcher, EventProcessor, EventTags, LogEvent,
        UserEvent, UserEventPayload,
    },
    notification::{DecisionNotificationType, Notification, NotificationType},
    test_utils::read_datafile_json,
    user_context::UserContext,
    AttributeValue, Attributes, Error, ProjectConfig, Result,
};

#[derive(Default)]
struct RecordingProcessor {
    events: Mutex<Vec<UserEvent>>,
}

impl RecordingProcessor {
    fn take(&self) -> Vec<UserEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventProcessor for RecordingProcessor {
    fn process(&self, event: UserEvent) -> bool {
        self.events.lock().unwrap().push(event);
        true
    }
}

struct FakeCmab {
    variation_id: Option<&'static str>,
    calls: AtomicUsize,
}

impl FakeCmab {
    fn new(variation_id: Option<&'static str>) -> FakeCmab {
        FakeCmab {
            variation_id,
            calls: AtomicUsize::new(0),
        }
    }
}

impl CmabService for FakeCmab {
    fn get_decision(
        &self,
        _config: &ProjectConfig,
        _user: &UserContext,
        _rule_id: &str,
        _options: &DecideOptions,
    ) -> Result<CmabDecision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.variation_id {
            Some(variation_id) => Ok(CmabDecision {
                variation_id: variation_id.to_owned(),
                cmab_uuid: "cmab-uuid".to_owned(),
            }),
            None => Err(Error::InvalidCmabResponse("predictor unavailable".to_owned())),
        }
    }
}

fn config() -> ClientConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    ClientConfig::from_datafile(read_datafile_json("decide.json"))
}

fn client_with(processor: &Arc<RecordingProcessor>) -> Client {
    config()
        .event_processor(processor.clone())
        .cmab_service(Arc::new(FakeCmab::new(Some("32301"))))
        .to_client()
        .unwrap()
}

fn attributes(pairs: &[(&str, AttributeValue)]) -> Attributes {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Bucketed into `treatment` of `checkout_test`.
fn us_user_1() -> UserContext {
    UserContext::new("user_1", attributes(&[("country", "US".into())]))
}

/// Bucketed into `control` of `checkout_test`.
fn us_user_2() -> UserContext {
    UserContext::new("user_2", attributes(&[("country", "US".into())]))
}

/// Fails `checkout_test` audience, bucketed into `adults_rule` of the rollout.
fn adult_user_1() -> UserContext {
    UserContext::new("user_1", attributes(&[("age", 30.into())]))
}

fn impression(event: &UserEvent) -> &crate::events::ImpressionEvent {
    match &event.payload {
        UserEventPayload::Impression(impression) => impression,
        other => panic!("expected impression, got {other:?}"),
    }
}

fn record_notifications(
    client: &Client,
    notification_type: NotificationType,
) -> Arc<Mutex<Vec<Notification>>> {
    let notifications = Arc::new(Mutex::new(Vec::new()));
    {
        let notifications = notifications.clone();
        client
            .notification_center()
            .add(notification_type, move |notification| {
                notifications.lock().unwrap().push(notification.clone());
            });
    }
    notifications
}

#[test]
fn requires_config_source() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = ClientConfig::from_datafile(Vec::new());
    assert!(matches!(config.to_client(), Err(Error::InvalidDatafile(_))));

    let config = ClientConfig {
        datafile: None,
        ..ClientConfig::from_datafile(Vec::new())
    };
    assert!(matches!(config.to_client(), Err(Error::InvalidArgument(_))));
}

#[test]
fn feature_enabled_by_feature_test() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);

    assert!(client.is_feature_enabled("checkout_flow", &us_user_1()).unwrap());
    let events = processor.take();
    assert_eq!(events.len(), 1);
    let event = impression(&events[0]);
    assert_eq!(event.flag_key, "checkout_flow");
    assert_eq!(event.rule_key, "checkout_test");
    assert_eq!(event.variation_key, "treatment");
    assert_eq!(event.rule_type, DecisionSource::FeatureTest);
    assert!(event.enabled);

    assert!(!client.is_feature_enabled("checkout_flow", &us_user_2()).unwrap());
    let events = processor.take();
    assert_eq!(events.len(), 1);
    assert_eq!(impression(&events[0]).variation_key, "control");
}

#[test]
fn feature_enabled_by_rollout() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);

    assert!(client.is_feature_enabled("checkout_flow", &adult_user_1()).unwrap());
    // Datafile asks for flag decisions, so rollouts produce impressions too.
    let events = processor.take();
    assert_eq!(events.len(), 1);
    let event = impression(&events[0]);
    assert_eq!(event.rule_type, DecisionSource::Rollout);
    assert_eq!(event.rule_key, "adults_rule");
    assert_eq!(event.variation_key, "rollout_on");
}

#[test]
fn feature_enabled_errors() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);

    assert!(matches!(
        client.is_feature_enabled("checkout_flow", &UserContext::new("", Attributes::new())),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        client.is_feature_enabled("no_such_flag", &us_user_1()),
        Err(Error::FeatureNotFound(_))
    ));
    assert!(processor.take().is_empty());
}

#[test]
fn typed_feature_variables() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = us_user_1();

    assert_eq!(
        client
            .get_feature_variable_string("checkout_flow", "button_color", &user)
            .unwrap(),
        "green"
    );
    assert_eq!(
        client
            .get_feature_variable_json("checkout_flow", "layout", &user)
            .unwrap(),
        json!({"columns": 2})
    );
    assert_eq!(
        client
            .get_feature_variable_double("checkout_flow", "discount", &user)
            .unwrap(),
        0.25
    );
    assert!(!client
        .get_feature_variable_boolean("checkout_flow", "express", &user)
        .unwrap());
}

#[test]
fn invalid_variable_value_falls_back_to_default() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = us_user_1();

    // The treatment variation overrides max_items with a value that is not an integer.
    assert_eq!(
        client
            .get_feature_variable_integer("checkout_flow", "max_items", &user)
            .unwrap(),
        10
    );
    assert_eq!(
        client
            .get_feature_variable("checkout_flow", "max_items", &user)
            .unwrap()
            .as_i64(),
        Some(10)
    );
}

#[test]
fn invalid_default_value_is_an_error() {
    let variable = Variable {
        id: "1".into(),
        key: "limit".into(),
        variable_type: VariableType::Integer,
        default_value: "many".to_owned(),
    };
    let decision = FeatureDecision {
        experiment: None,
        variation: None,
        source: DecisionSource::Rollout,
        reason: DecisionReason::NoRolloutForFeature,
        cmab_uuid: None,
    };

    assert!(matches!(
        resolve_variable(&decision, &variable, &mut DecisionReasons::new(false)),
        Err(Error::InvalidAttributeValueType { .. })
    ));
}

#[test]
fn disabled_feature_returns_default_variables() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = us_user_2();

    assert_eq!(
        client
            .get_feature_variable_string("checkout_flow", "button_color", &user)
            .unwrap(),
        "blue"
    );
    assert_eq!(
        client
            .get_feature_variable_integer("checkout_flow", "max_items", &user)
            .unwrap(),
        10
    );
}

#[test]
fn rollout_variables() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = adult_user_1();

    assert_eq!(
        client
            .get_feature_variable_integer("checkout_flow", "max_items", &user)
            .unwrap(),
        20
    );
    assert!(client
        .get_feature_variable_boolean("checkout_flow", "express", &user)
        .unwrap());
    assert_eq!(
        client
            .get_feature_variable("checkout_flow", "discount", &user)
            .unwrap()
            .as_f64(),
        Some(0.5)
    );
}

#[test]
fn feature_variable_errors() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = us_user_1();

    assert!(matches!(
        client.get_feature_variable_integer("checkout_flow", "button_color", &user),
        Err(Error::VariableTypeMismatch { .. })
    ));
    assert!(matches!(
        client.get_feature_variable_string("checkout_flow", "missing", &user),
        Err(Error::VariableNotFound { .. })
    ));
    assert!(matches!(
        client.get_feature_variable_string("missing", "button_color", &user),
        Err(Error::FeatureNotFound(_))
    ));
}

#[test]
fn all_feature_variables_default_invalid_values() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let notifications = record_notifications(&client, NotificationType::Decision);

    let variables = client
        .get_all_feature_variables("checkout_flow", &us_user_1())
        .unwrap();
    assert_eq!(
        serde_json::Value::Object(variables),
        json!({
            "button_color": "green",
            "layout": {"columns": 2},
            "discount": 0.25,
            "max_items": 10,
            "express": false,
        })
    );

    let notifications = notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    let Notification::Decision(notification) = &notifications[0] else {
        panic!("expected decision notification");
    };
    assert_eq!(
        notification.decision_type,
        DecisionNotificationType::AllFeatureVariables
    );
    assert_eq!(notification.decision_info["featureEnabled"], json!(true));
}

#[test]
fn enabled_features_in_datafile_order() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);

    assert_eq!(
        client.get_enabled_features(&adult_user_1()).unwrap(),
        vec!["checkout_flow".to_owned(), "cmab_flag".to_owned()]
    );
}

#[test]
fn activate_sends_impression() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);

    assert_eq!(
        client.activate("checkout_test", &us_user_1()).unwrap().as_deref(),
        Some("treatment")
    );
    let events = processor.take();
    assert_eq!(events.len(), 1);
    let event = impression(&events[0]);
    assert_eq!(event.rule_type, DecisionSource::Experiment);
    assert_eq!(event.flag_key, "");
    assert_eq!(event.campaign_id, "31001");
    assert_eq!(event.variation_id, "30102");

    assert_eq!(client.activate("checkout_test", &adult_user_1()).unwrap(), None);
    assert_eq!(client.activate("paused_test", &us_user_1()).unwrap(), None);
    assert!(processor.take().is_empty());

    assert!(matches!(
        client.activate("no_such_experiment", &us_user_1()),
        Err(Error::ExperimentNotFound(_))
    ));
}

#[test]
fn get_variation_does_not_send_impression() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let notifications = record_notifications(&client, NotificationType::Decision);

    assert_eq!(
        client.get_variation("checkout_test", &us_user_2()).unwrap().as_deref(),
        Some("control")
    );
    assert!(processor.take().is_empty());

    let notifications = notifications.lock().unwrap();
    let Notification::Decision(notification) = &notifications[0] else {
        panic!("expected decision notification");
    };
    assert_eq!(notification.decision_type, DecisionNotificationType::AbTest);
    assert_eq!(
        notification.decision_info,
        json!({"experimentKey": "checkout_test", "variationKey": "control"})
    );
}

#[test]
fn track_sends_conversion() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let notifications = record_notifications(&client, NotificationType::Track);

    let tags: EventTags = [("revenue".to_owned(), json!(4200))].into_iter().collect();
    client.track("purchase", &us_user_1(), tags).unwrap();

    let events = processor.take();
    assert_eq!(events.len(), 1);
    let UserEventPayload::Conversion(conversion) = &events[0].payload else {
        panic!("expected conversion");
    };
    assert_eq!(conversion.key, "purchase");
    assert_eq!(conversion.entity_id, "20001");
    assert_eq!(conversion.revenue, Some(4200));
    assert_eq!(notifications.lock().unwrap().len(), 1);

    assert!(matches!(
        client.track("no_such_event", &us_user_1(), EventTags::new()),
        Err(Error::EventNotFound(_))
    ));
    assert!(processor.take().is_empty());
    assert_eq!(notifications.lock().unwrap().len(), 1);
}

#[test]
fn forced_variations() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = us_user_1();

    client
        .set_forced_variation("checkout_test", "user_1", "control")
        .unwrap();
    assert_eq!(
        client.get_forced_variation("checkout_test", "user_1").as_deref(),
        Some("control")
    );
    assert_eq!(
        client.get_variation("checkout_test", &user).unwrap().as_deref(),
        Some("control")
    );

    assert!(client.remove_forced_variation("checkout_test", "user_1"));
    assert!(!client.remove_forced_variation("checkout_test", "user_1"));
    assert_eq!(
        client.get_variation("checkout_test", &user).unwrap().as_deref(),
        Some("treatment")
    );

    assert!(matches!(
        client.set_forced_variation("checkout_test", "user_1", "no_such_variation"),
        Err(Error::VariationNotFound { .. })
    ));
    assert!(matches!(
        client.set_forced_variation("no_such_experiment", "user_1", "control"),
        Err(Error::ExperimentNotFound(_))
    ));
}

#[test]
fn decide_feature_test() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let notifications = record_notifications(&client, NotificationType::Decision);
    let user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));

    let decision = user.decide("checkout_flow", &[]);
    assert!(decision.enabled);
    assert_eq!(decision.variation_key.as_deref(), Some("treatment"));
    assert_eq!(decision.rule_key.as_deref(), Some("checkout_test"));
    assert_eq!(decision.flag_key, "checkout_flow");
    assert_eq!(decision.user_id, "user_1");
    assert_eq!(decision.variables["button_color"], json!("green"));
    assert_eq!(decision.variables["max_items"], json!(10));
    // Errors are reported even without IncludeReasons.
    assert_eq!(decision.reasons.len(), 1);
    assert!(decision.reasons[0].contains("max_items"));
    assert_eq!(processor.take().len(), 1);

    let notifications = notifications.lock().unwrap();
    assert_eq!(notifications.len(), 1);
    let Notification::Decision(notification) = &notifications[0] else {
        panic!("expected decision notification");
    };
    assert_eq!(notification.decision_type, DecisionNotificationType::Flag);
    assert_eq!(notification.decision_info["decisionEventDispatched"], json!(true));
    assert_eq!(notification.decision_info["variationKey"], json!("treatment"));
}

#[test]
fn decide_options() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));

    let decision = user.decide(
        "checkout_flow",
        &[
            DecideOption::ExcludeVariables,
            DecideOption::DisableDecisionEvent,
            DecideOption::IncludeReasons,
        ],
    );
    assert!(decision.enabled);
    assert!(decision.variables.is_empty());
    assert!(!decision.reasons.is_empty());
    assert!(processor.take().is_empty());
}

#[test]
fn default_decide_options_apply() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = config()
        .event_processor(processor.clone())
        .cmab_service(Arc::new(FakeCmab::new(Some("32301"))))
        .default_decide_options([DecideOption::DisableDecisionEvent])
        .to_client()
        .unwrap();
    let user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));

    assert!(user.decide("checkout_flow", &[]).enabled);
    assert!(processor.take().is_empty());
}

#[test]
fn decide_unknown_flag() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = client.create_user_context("user_1", Attributes::new());

    let decision = user.decide("no_such_flag", &[]);
    assert!(!decision.enabled);
    assert_eq!(decision.variation_key, None);
    assert_eq!(
        decision.reasons,
        vec!["No flag was found for key \"no_such_flag\".".to_owned()]
    );
    assert!(processor.take().is_empty());
}

#[test]
fn decide_all_and_for_keys() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = client.create_user_context("user_1", attributes(&[("age", 30.into())]));

    let decisions = user.decide_all(&[]);
    assert_eq!(decisions.len(), 4);
    assert!(!decisions["search_ranking"].enabled);
    assert!(!decisions["no_rollout_flag"].enabled);
    assert_eq!(
        decisions["no_rollout_flag"].variables["greeting"],
        json!("hello")
    );

    let mut enabled = user
        .decide_all(&[DecideOption::EnabledFlagsOnly])
        .into_keys()
        .collect::<Vec<_>>();
    enabled.sort();
    assert_eq!(enabled, vec!["checkout_flow", "cmab_flag"]);

    let decisions = user.decide_for_keys(&["checkout_flow", "no_such_flag"], &[]);
    assert_eq!(decisions.len(), 2);
    assert_eq!(
        decisions["checkout_flow"].variation_key.as_deref(),
        Some("rollout_on")
    );
    assert!(!decisions["no_such_flag"].enabled);
}

#[test]
fn forced_decisions_on_user_context() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let mut user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));
    let context = OptimizelyDecisionContext::flag("checkout_flow");

    user.set_forced_decision(context.clone(), OptimizelyForcedDecision::new("control"));
    assert_eq!(
        user.get_forced_decision(&context).map(|d| d.variation_key.as_str()),
        Some("control")
    );
    let decision = user.decide("checkout_flow", &[]);
    assert_eq!(decision.variation_key.as_deref(), Some("control"));
    assert!(!decision.enabled);

    assert!(user.remove_forced_decision(&context));
    assert!(!user.remove_forced_decision(&context));
    assert_eq!(
        user.decide("checkout_flow", &[]).variation_key.as_deref(),
        Some("treatment")
    );

    user.set_forced_decision(
        OptimizelyDecisionContext::rule("checkout_flow", "checkout_test"),
        OptimizelyForcedDecision::new("control"),
    );
    user.remove_all_forced_decisions();
    assert_eq!(
        user.decide("checkout_flow", &[]).variation_key.as_deref(),
        Some("treatment")
    );
}

#[test]
fn cmab_decision() {
    let processor = Arc::new(RecordingProcessor::default());
    let cmab = Arc::new(FakeCmab::new(Some("32301")));
    let client = config()
        .event_processor(processor.clone())
        .cmab_service(cmab.clone())
        .to_client()
        .unwrap();
    let user = client.create_user_context("user_1", attributes(&[("age", 30.into())]));

    let decision = user.decide("cmab_flag", &[]);
    assert!(decision.enabled);
    assert_eq!(decision.variation_key.as_deref(), Some("cmab_a"));
    assert_eq!(cmab.calls.load(Ordering::SeqCst), 1);

    let events = processor.take();
    assert_eq!(events.len(), 1);
    assert_eq!(impression(&events[0]).cmab_uuid.as_deref(), Some("cmab-uuid"));

    // Outside of CMAB traffic, the predictor is not called.
    let user = client.create_user_context("user_5", attributes(&[("age", 30.into())]));
    assert!(!user.decide("cmab_flag", &[]).enabled);
    assert_eq!(cmab.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cmab_failure_yields_disabled_decision() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = config()
        .event_processor(processor.clone())
        .cmab_service(Arc::new(FakeCmab::new(None)))
        .to_client()
        .unwrap();
    let user = client.create_user_context("user_1", attributes(&[("age", 30.into())]));

    let decision = user.decide("cmab_flag", &[]);
    assert!(!decision.enabled);
    assert_eq!(decision.variation_key, None);
    assert_eq!(
        decision.reasons,
        vec!["Failed to fetch CMAB decision for experiment \"cmab_exp\".".to_owned()]
    );
    assert!(processor.take().is_empty());

    assert!(matches!(
        client.is_feature_enabled("cmab_flag", &adult_user_1()),
        Err(Error::CmabFetchFailed { .. })
    ));
}

#[test]
fn user_profile_is_saved() {
    let processor = Arc::new(RecordingProcessor::default());
    let profiles = Arc::new(InMemoryUserProfileService::new());
    let client = config()
        .event_processor(processor.clone())
        .cmab_service(Arc::new(FakeCmab::new(None)))
        .user_profile_service(profiles.clone())
        .to_client()
        .unwrap();

    assert!(client.is_feature_enabled("checkout_flow", &us_user_1()).unwrap());
    let profile = profiles.lookup("user_1").unwrap();
    assert_eq!(profile.variation_for_experiment("30001"), Some("30102"));
}

#[test]
fn close_is_idempotent() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = client_with(&processor);
    let user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));

    client.close().unwrap();
    client.close().unwrap();
    assert!(client.is_closed());

    assert!(matches!(
        user.track_event("purchase", EventTags::new()),
        Err(Error::ClientClosed)
    ));
    // Decisions still work off the last config, but nothing is sent.
    assert!(user.decide("checkout_flow", &[]).enabled);
    assert!(processor.take().is_empty());
}

#[derive(Default)]
struct RecordingDispatcher {
    batches: Mutex<Vec<LogEvent>>,
}

#[async_trait]
impl EventDispatcher for RecordingDispatcher {
    async fn dispatch_event(&self, event: &LogEvent) -> Result<()> {
        self.batches.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[test]
fn close_flushes_batched_events() {
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let client = config()
        .event_dispatcher(dispatcher.clone())
        .event_processor_config(BatchEventProcessorConfig::new().with_batch_size(100))
        .cmab_service(Arc::new(FakeCmab::new(None)))
        .to_client()
        .unwrap();
    let user = client.create_user_context("user_1", attributes(&[("country", "US".into())]));

    user.decide("checkout_flow", &[]);
    user.track_event("purchase", EventTags::new()).unwrap();
    client.close().unwrap();

    let batches = dispatcher.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].event.visitors.len(), 2);
    assert_eq!(batches[0].event.revision, "241");
}

#[tokio::test]
async fn default_cmab_service_inside_runtime() {
    let processor = Arc::new(RecordingProcessor::default());
    let client = config()
        .event_processor(processor.clone())
        .cmab_config(
            CmabConfig::new()
                .prediction_endpoint("http://127.0.0.1:9/predict/%s")
                .request_timeout(Duration::from_secs(2))
                .retry(None),
        )
        .to_client()
        .unwrap();
    let user = client.create_user_context("user_1", attributes(&[("age", 30.into())]));

    let decision = user.decide("cmab_flag", &[]);
    assert!(!decision.enabled);
    assert_eq!(
        decision.reasons,
        vec!["Failed to fetch CMAB decision for experiment \"cmab_exp\".".to_owned()]
    );
    assert!(user.decide("checkout_flow", &[]).enabled);

    client.close().unwrap();
    assert!(!user.decide("cmab_flag", &[]).enabled);
}
