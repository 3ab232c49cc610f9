//! Datafile wire format.
//!
//! These types mirror the JSON served by the CDN. They are compiled into
//! [`entities`](crate::entities) by [`ProjectConfig`](crate::ProjectConfig).
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    entities::{ExperimentStatus, GroupPolicy, Integration, Range},
    Str,
};

/// Root of the datafile.
///
/// Fields without `#[serde(default)]` are required: a datafile missing any of them is invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct DatafileWire {
    pub version: String,
    pub account_id: Str,
    pub project_id: Str,
    pub revision: Str,
    pub attributes: Vec<AttributeWire>,
    pub audiences: Vec<AudienceWire>,
    #[serde(default)]
    pub typed_audiences: Vec<AudienceWire>,
    pub events: Vec<EventWire>,
    pub experiments: Vec<ExperimentWire>,
    pub feature_flags: Vec<FeatureFlagWire>,
    pub groups: Vec<GroupWire>,
    pub rollouts: Vec<RolloutWire>,
    #[serde(default, rename = "anonymizeIP")]
    pub anonymize_ip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_filtering: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdk_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_key: Option<String>,
    #[serde(default)]
    pub send_flag_decisions: bool,
    #[serde(default)]
    pub integrations: Vec<Integration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AttributeWire {
    pub id: Str,
    pub key: Str,
}

/// Audience in either legacy (conditions encoded as a JSON string) or typed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct AudienceWire {
    pub id: Str,
    pub name: Str,
    pub conditions: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct EventWire {
    pub id: Str,
    pub key: Str,
    #[serde(default)]
    pub experiment_ids: Vec<Str>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ExperimentWire {
    pub id: Str,
    pub key: Str,
    #[serde(default)]
    pub layer_id: Str,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub variations: Vec<VariationWire>,
    #[serde(default)]
    pub traffic_allocation: Vec<Range>,
    #[serde(default)]
    pub audience_ids: Vec<Str>,
    /// Takes precedence over `audience_ids` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_conditions: Option<serde_json::Value>,
    #[serde(default)]
    pub forced_variations: HashMap<String, Str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmab: Option<CmabWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct CmabWire {
    #[serde(default)]
    pub attribute_ids: Vec<Str>,
    #[serde(default)]
    pub traffic_allocation: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct VariationWire {
    pub id: Str,
    pub key: Str,
    #[serde(default)]
    pub feature_enabled: bool,
    #[serde(default)]
    pub variables: Vec<VariableValueWire>,
}

/// Variable override within a variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct VariableValueWire {
    pub id: Str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FeatureFlagWire {
    pub id: Str,
    pub key: Str,
    #[serde(default)]
    pub rollout_id: Str,
    #[serde(default)]
    pub experiment_ids: Vec<Str>,
    #[serde(default)]
    pub variables: Vec<VariableWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct VariableWire {
    pub id: Str,
    pub key: Str,
    /// One of `string`, `boolean`, `integer`, `double` or `json`.
    #[serde(rename = "type")]
    pub variable_type: String,
    /// Older datafiles declare JSON variables as `type: "string", subType: "json"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    pub default_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct GroupWire {
    pub id: Str,
    pub policy: GroupPolicy,
    #[serde(default)]
    pub traffic_allocation: Vec<Range>,
    #[serde(default)]
    pub experiments: Vec<ExperimentWire>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct RolloutWire {
    pub id: Str,
    #[serde(default)]
    pub experiments: Vec<ExperimentWire>,
}

/// Minimal view of the datafile used to check its version before full decoding.
#[derive(Debug, Deserialize)]
pub(crate) struct DatafileVersion {
    pub version: String,
}
