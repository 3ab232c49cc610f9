use std::collections::HashMap;

use serde::Serialize;

use crate::{decision::DecisionSource, Str};

/// Tags attached to a conversion. `revenue` and `value` tags are also reported as dedicated
/// fields.
pub type EventTags = HashMap<String, serde_json::Value>;

/// Name reported as `client_name` of every batch.
pub const CLIENT_NAME: &str = "rust-sdk";

/// Version reported as `client_version` of every batch.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Project-level context of an event. Events are batched together only if their contexts
/// match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventContext {
    #[allow(missing_docs)]
    pub account_id: Str,
    #[allow(missing_docs)]
    pub project_id: Str,
    /// Datafile revision the event was produced with.
    pub revision: Str,
    #[allow(missing_docs)]
    pub client_name: &'static str,
    #[allow(missing_docs)]
    pub client_version: &'static str,
    #[allow(missing_docs)]
    pub anonymize_ip: bool,
    /// Bot filtering setting of the datafile, if present.
    pub bot_filtering: Option<bool>,
}

impl EventContext {
    /// Check whether events with both contexts may share a batch.
    pub fn is_batchable_with(&self, other: &EventContext) -> bool {
        self.project_id == other.project_id && self.revision == other.revision
    }
}

/// User attribute as reported to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorAttribute {
    /// Attribute id, or the key itself for reserved `$opt_` attributes.
    pub entity_id: Str,
    #[allow(missing_docs)]
    pub key: String,
    /// Always `custom`.
    #[serde(rename = "type")]
    pub attribute_type: &'static str,
    #[allow(missing_docs)]
    pub value: serde_json::Value,
}

/// A user was exposed to a variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpressionEvent {
    /// Campaign (layer) id.
    pub campaign_id: Str,
    #[allow(missing_docs)]
    pub experiment_id: Str,
    /// Empty if the user was not assigned a variation.
    pub variation_id: Str,
    #[allow(missing_docs)]
    pub variation_key: Str,
    #[allow(missing_docs)]
    pub flag_key: Str,
    #[allow(missing_docs)]
    pub rule_key: Str,
    #[allow(missing_docs)]
    pub rule_type: DecisionSource,
    /// Whether the feature was enabled for the user.
    pub enabled: bool,
    /// Prediction id of CMAB decisions.
    pub cmab_uuid: Option<String>,
}

/// A user performed a tracked event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionEvent {
    /// Event id.
    pub entity_id: Str,
    /// Event key.
    pub key: Str,
    /// Integer `revenue` tag.
    pub revenue: Option<i64>,
    /// Numeric `value` tag.
    pub value: Option<f64>,
    #[allow(missing_docs)]
    pub tags: EventTags,
}

/// Payload of a [`UserEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEventPayload {
    #[allow(missing_docs)]
    Impression(ImpressionEvent),
    #[allow(missing_docs)]
    Conversion(ConversionEvent),
}

/// Event produced by a user call, waiting to be batched and dispatched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[allow(missing_docs)]
    pub uuid: String,
    #[allow(missing_docs)]
    pub context: EventContext,
    /// User id.
    pub visitor_id: String,
    #[allow(missing_docs)]
    pub attributes: Vec<VisitorAttribute>,
    #[allow(missing_docs)]
    pub payload: UserEventPayload,
}
