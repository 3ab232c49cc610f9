//! Construction of [`UserEvent`]s from decisions and tracked events.
use crate::{
    datafile::ProjectConfig, decision::FeatureDecision, user_context::UserContext, Attributes,
    Result, Str,
};

use super::{
    ConversionEvent, EventContext, EventTags, ImpressionEvent, UserEvent, UserEventPayload,
    VisitorAttribute, CLIENT_NAME, CLIENT_VERSION,
};

/// Attribute reporting the bot filtering setting of the datafile.
pub const BOT_FILTERING_ATTRIBUTE: &str = "$opt_bot_filtering";

const RESERVED_ATTRIBUTE_PREFIX: &str = "$opt_";
const REVENUE_TAG: &str = "revenue";
const VALUE_TAG: &str = "value";

fn event_context(config: &ProjectConfig) -> EventContext {
    EventContext {
        account_id: config.account_id().clone(),
        project_id: config.project_id().clone(),
        revision: config.revision().clone(),
        client_name: CLIENT_NAME,
        client_version: CLIENT_VERSION,
        anonymize_ip: config.anonymize_ip(),
        bot_filtering: config.bot_filtering(),
    }
}

fn user_event(config: &ProjectConfig, user: &UserContext, payload: UserEventPayload) -> UserEvent {
    UserEvent {
        timestamp: chrono::Utc::now().timestamp_millis(),
        uuid: uuid::Uuid::new_v4().to_string(),
        context: event_context(config),
        visitor_id: user.id.clone(),
        attributes: visitor_attributes(config, &user.attributes),
        payload,
    }
}

/// Map user attributes to their datafile ids.
///
/// Unknown attributes are dropped unless they are reserved (`$opt_` prefixed), in which case the
/// key doubles as id. Null values are dropped.
pub fn visitor_attributes(
    config: &ProjectConfig,
    attributes: &Attributes,
) -> Vec<VisitorAttribute> {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();

    let mut result: Vec<VisitorAttribute> = keys
        .into_iter()
        .filter_map(|key| {
            let value = &attributes[key];
            if value.is_null() {
                return None;
            }

            let entity_id = match config.attribute_id(key) {
                Some(id) => id.clone(),
                None if key.starts_with(RESERVED_ATTRIBUTE_PREFIX) => Str::from(key.as_str()),
                None => {
                    log::debug!(target: "optimizely", attribute_key = key.as_str();
                                "unknown attribute is not reported");
                    return None;
                }
            };

            Some(VisitorAttribute {
                entity_id,
                key: key.clone(),
                attribute_type: "custom",
                value: value.to_json(),
            })
        })
        .collect();

    if let Some(bot_filtering) = config.bot_filtering() {
        result.push(VisitorAttribute {
            entity_id: Str::from(BOT_FILTERING_ATTRIBUTE),
            key: BOT_FILTERING_ATTRIBUTE.to_owned(),
            attribute_type: "custom",
            value: serde_json::Value::Bool(bot_filtering),
        });
    }

    result
}

/// Create an impression of `decision` for `user`.
///
/// `flag_key` is empty for plain experiment activations.
pub fn create_impression_event(
    config: &ProjectConfig,
    decision: &FeatureDecision,
    flag_key: &str,
    user: &UserContext,
) -> UserEvent {
    let (campaign_id, experiment_id, rule_key) = match decision.experiment {
        Some(experiment) => (
            experiment.layer_id.clone(),
            experiment.id.clone(),
            experiment.key.clone(),
        ),
        None => (Str::default(), Str::default(), Str::default()),
    };
    let (variation_id, variation_key) = match decision.variation {
        Some(variation) => (variation.id.clone(), variation.key.clone()),
        None => (Str::default(), Str::default()),
    };

    let impression = ImpressionEvent {
        campaign_id,
        experiment_id,
        variation_id,
        variation_key,
        flag_key: Str::from(flag_key),
        rule_key,
        rule_type: decision.source,
        enabled: decision.enabled(),
        cmab_uuid: decision.cmab_uuid.clone(),
    };

    user_event(config, user, UserEventPayload::Impression(impression))
}

/// Create a conversion of event `event_key` for `user`.
///
/// # Errors
///
/// Returns [`Error::EventNotFound`](crate::Error::EventNotFound) if the event is not defined in
/// the datafile.
pub fn create_conversion_event(
    config: &ProjectConfig,
    event_key: &str,
    user: &UserContext,
    tags: EventTags,
) -> Result<UserEvent> {
    let event = config.event(event_key)?;

    let conversion = ConversionEvent {
        entity_id: event.id.clone(),
        key: event.key.clone(),
        revenue: tags.get(REVENUE_TAG).and_then(revenue_value),
        value: tags.get(VALUE_TAG).and_then(numeric_value),
        tags,
    };

    Ok(user_event(config, user, UserEventPayload::Conversion(conversion)))
}

/// Integer revenue of a tag value. Floats are accepted only if they have no fractional part.
fn revenue_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(s) => s.parse().ok().filter(|f: &f64| f.is_finite()),
        _ => None,
    }
}
