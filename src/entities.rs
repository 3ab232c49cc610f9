//! Immutable entities derived from the datafile.
//!
//! Entities reference each other by id. [`ProjectConfig`](crate::ProjectConfig) owns every entity
//! and provides the lookups that dereference those ids.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{audience::ConditionTree, Str};

/// A user attribute declared in the datafile.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
}

/// A named predicate over user attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Audience {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub name: Str,
    /// Original conditions as found in the datafile.
    pub conditions: serde_json::Value,
    /// Compiled conditions. `None` if conditions could not be compiled.
    pub condition_tree: Option<ConditionTree>,
}

/// A conversion event declared in the datafile.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
    #[allow(missing_docs)]
    pub experiment_ids: Vec<Str>,
}

/// Experiment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum ExperimentStatus {
    Running,
    Launched,
    Paused,
    #[serde(rename = "Not started")]
    NotStarted,
    Archived,
}

impl ExperimentStatus {
    /// Only running and launched experiments are evaluated.
    pub fn is_active(self) -> bool {
        matches!(self, ExperimentStatus::Running | ExperimentStatus::Launched)
    }
}

/// A slot of a traffic allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    /// Variation id (or experiment id for groups). May be empty for an unallocated slot.
    pub entity_id: Str,
    /// Exclusive upper bound of the slot, in `[0, 10000]`.
    pub end_of_range: u32,
}

/// CMAB settings of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmab {
    /// Ids of attributes forwarded to the remote predictor.
    pub attribute_ids: Vec<Str>,
    /// Share of traffic (out of 10000) routed to the predictor.
    pub traffic_allocation: u32,
}

/// Origin of an experiment within the datafile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Standalone A/B test or feature test.
    Experiment,
    /// A targeted delivery rule of a rollout.
    Rollout,
}

/// An experiment or a rollout rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
    /// Layer (campaign) id reported in impressions.
    pub layer_id: Str,
    #[allow(missing_docs)]
    pub status: ExperimentStatus,
    /// Variations in datafile order.
    pub variations: Vec<Variation>,
    /// Cumulative traffic allocation sorted by `end_of_range`.
    pub traffic_allocation: Vec<Range>,
    /// Legacy audience ids.
    pub audience_ids: Vec<Str>,
    /// Compiled audience conditions. Legacy `audience_ids` are compiled to an implicit `or`.
    pub audience_conditions: Option<ConditionTree>,
    /// Whitelist: user id -> variation key.
    pub forced_variations: HashMap<String, Str>,
    /// Set for experiments that belong to a mutex group.
    pub group_id: Option<Str>,
    /// Set for CMAB experiments.
    pub cmab: Option<Cmab>,
    #[allow(missing_docs)]
    pub kind: RuleKind,
}

impl Experiment {
    /// Find variation by id.
    pub fn variation_by_id(&self, id: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }

    /// Find variation by key.
    pub fn variation_by_key(&self, key: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.key == key)
    }
}

/// A variation of an experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Variation {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
    /// Whether the feature is enabled for users in this variation.
    pub feature_enabled: bool,
    /// Variable overrides: variable id -> raw value.
    pub variables: HashMap<Str, String>,
}

/// Type of a feature variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum VariableType {
    String,
    Boolean,
    Integer,
    Double,
    Json,
}

/// A feature variable with its default value.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
    #[allow(missing_docs)]
    pub variable_type: VariableType,
    /// Raw default value, coerced on read.
    pub default_value: String,
}

/// A feature flag.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub key: Str,
    /// Empty if the feature has no rollout.
    pub rollout_id: Str,
    /// Ids of feature tests, in evaluation order.
    pub experiment_ids: Vec<Str>,
    /// Variables in datafile order.
    pub variables: Vec<Variable>,
}

impl Feature {
    /// Find variable by key.
    pub fn variable(&self, key: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.key == key)
    }
}

/// Group traffic policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPolicy {
    /// Mutually exclusive experiments.
    Random,
    /// Experiments may overlap. Group bucketing is skipped.
    Overlapping,
}

/// A group of experiments sharing traffic.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub policy: GroupPolicy,
    /// Ids of member experiments.
    pub experiment_ids: Vec<Str>,
    /// Allocation of group traffic to member experiments.
    pub traffic_allocation: Vec<Range>,
}

/// An ordered list of delivery rules. The last rule is "everyone else".
#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    #[allow(missing_docs)]
    pub id: Str,
    #[allow(missing_docs)]
    pub experiments: Vec<Experiment>,
}

/// Third-party integration settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Integration {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}
