//! Ingest wire format.
use serde::{Deserialize, Serialize};

use super::{EventTags, UserEvent, UserEventPayload, VisitorAttribute};

/// Default ingest endpoint.
pub const DEFAULT_EVENT_ENDPOINT: &str = "https://logx.optimizely.com/v1/events";

const ACTIVATE_EVENT_KEY: &str = "campaign_activated";

/// A batch of events, as posted to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    #[allow(missing_docs)]
    pub account_id: String,
    #[allow(missing_docs)]
    pub project_id: String,
    #[allow(missing_docs)]
    pub revision: String,
    #[allow(missing_docs)]
    pub client_name: String,
    #[allow(missing_docs)]
    pub client_version: String,
    #[allow(missing_docs)]
    pub anonymize_ip: bool,
    #[allow(missing_docs)]
    pub enrich_decisions: bool,
    /// One entry per user event.
    pub visitors: Vec<Visitor>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visitor {
    pub visitor_id: String,
    pub attributes: Vec<Attribute>,
    pub snapshots: Vec<Snapshot>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub entity_id: String,
    pub key: String,
    #[serde(rename = "type")]
    pub attribute_type: String,
    pub value: serde_json::Value,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<Decision>,
    pub events: Vec<SnapshotEvent>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub campaign_id: String,
    pub experiment_id: String,
    pub variation_id: String,
    pub metadata: DecisionMetadata,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetadata {
    pub flag_key: String,
    pub rule_key: String,
    pub rule_type: String,
    pub variation_key: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmab_uuid: Option<String>,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEvent {
    pub entity_id: String,
    pub key: String,
    pub timestamp: i64,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<EventTags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
}

/// A batch ready to be dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Ingest endpoint.
    pub endpoint: String,
    #[allow(missing_docs)]
    pub event: EventBatch,
}

impl From<&VisitorAttribute> for Attribute {
    fn from(value: &VisitorAttribute) -> Self {
        Attribute {
            entity_id: value.entity_id.to_string(),
            key: value.key.clone(),
            attribute_type: value.attribute_type.to_owned(),
            value: value.value.clone(),
        }
    }
}

fn visitor(event: &UserEvent) -> Visitor {
    let snapshot = match &event.payload {
        UserEventPayload::Impression(impression) => Snapshot {
            decisions: vec![Decision {
                campaign_id: impression.campaign_id.to_string(),
                experiment_id: impression.experiment_id.to_string(),
                variation_id: impression.variation_id.to_string(),
                metadata: DecisionMetadata {
                    flag_key: impression.flag_key.to_string(),
                    rule_key: impression.rule_key.to_string(),
                    rule_type: impression.rule_type.as_str().to_owned(),
                    variation_key: impression.variation_key.to_string(),
                    enabled: impression.enabled,
                    cmab_uuid: impression.cmab_uuid.clone(),
                },
            }],
            events: vec![SnapshotEvent {
                entity_id: impression.campaign_id.to_string(),
                key: ACTIVATE_EVENT_KEY.to_owned(),
                timestamp: event.timestamp,
                uuid: event.uuid.clone(),
                tags: None,
                revenue: None,
                value: None,
                event_type: Some(ACTIVATE_EVENT_KEY.to_owned()),
            }],
        },
        UserEventPayload::Conversion(conversion) => Snapshot {
            decisions: Vec::new(),
            events: vec![SnapshotEvent {
                entity_id: conversion.entity_id.to_string(),
                key: conversion.key.to_string(),
                timestamp: event.timestamp,
                uuid: event.uuid.clone(),
                tags: (!conversion.tags.is_empty()).then(|| conversion.tags.clone()),
                revenue: conversion.revenue,
                value: conversion.value,
                event_type: None,
            }],
        },
    };

    Visitor {
        visitor_id: event.visitor_id.clone(),
        attributes: event.attributes.iter().map(Attribute::from).collect(),
        snapshots: vec![snapshot],
    }
}

/// Build a batch out of `events`. Returns `None` for an empty slice.
///
/// The batch header is taken from the first event, so callers must only pass events with
/// batchable contexts.
pub fn create_log_event(events: &[UserEvent], endpoint: &str) -> Option<LogEvent> {
    let first = events.first()?;
    let context = &first.context;

    Some(LogEvent {
        endpoint: endpoint.to_owned(),
        event: EventBatch {
            account_id: context.account_id.to_string(),
            project_id: context.project_id.to_string(),
            revision: context.revision.to_string(),
            client_name: context.client_name.to_owned(),
            client_version: context.client_version.to_owned(),
            anonymize_ip: context.anonymize_ip,
            enrich_decisions: true,
            visitors: events.iter().map(visitor).collect(),
        },
    })
}
