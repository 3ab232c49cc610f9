use std::collections::{HashMap, HashSet};

use crate::{
    audience::ConditionTree,
    entities::{
        Attribute, Audience, Cmab, Event, Experiment, Feature, Group, Range,
        Rollout, RuleKind, Variable, VariableType, Variation,
    },
    Error, Result, Str,
};

use super::models::{
    AudienceWire, DatafileVersion, DatafileWire, ExperimentWire, FeatureFlagWire, VariableWire,
};

/// Datafile versions this SDK understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["4"];

/// Immutable snapshot of a project compiled from a datafile.
///
/// Entities live in a single arena of maps and reference each other by id. `ProjectConfig` is
/// never modified after construction. Config managers share it between readers as
/// `Arc<ProjectConfig>` and replace it as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    wire: DatafileWire,

    attributes_by_id: HashMap<Str, Attribute>,
    attribute_key_to_id: HashMap<Str, Str>,
    audiences: HashMap<Str, Audience>,
    events: HashMap<Str, Event>,
    /// Experiments and group experiments by id. Rollout rules are kept in `rollouts`.
    experiments: HashMap<Str, Experiment>,
    experiment_key_to_id: HashMap<Str, Str>,
    /// Features in datafile order.
    features: Vec<Feature>,
    feature_key_to_index: HashMap<Str, usize>,
    feature_id_to_index: HashMap<Str, usize>,
    groups: HashMap<Str, Group>,
    rollouts: HashMap<Str, Rollout>,
    /// Experiment id -> keys of features using it.
    experiment_features: HashMap<Str, Vec<Str>>,
    /// Flag key -> every variation reachable from the flag.
    flag_variations: HashMap<Str, Vec<Variation>>,
}

impl ProjectConfig {
    /// Parse and compile a datafile.
    pub fn from_json(json: &[u8]) -> Result<ProjectConfig> {
        let header: DatafileVersion = serde_json::from_slice(json).map_err(|err| {
            log::warn!(target: "optimizely", "failed to decode datafile: {err}");
            Error::InvalidDatafile(err.to_string())
        })?;
        if !SUPPORTED_VERSIONS.contains(&header.version.as_str()) {
            log::warn!(target: "optimizely", version = header.version.as_str();
                       "unsupported datafile version");
            return Err(Error::UnsupportedDatafileVersion(header.version));
        }

        let wire: DatafileWire = serde_json::from_slice(json).map_err(|err| {
            log::warn!(target: "optimizely", "failed to decode datafile: {err}");
            Error::InvalidDatafile(err.to_string())
        })?;

        compile(wire)
    }

    /// Serialize the datafile this config was compiled from.
    pub fn to_datafile(&self) -> Result<String> {
        serde_json::to_string(&self.wire).map_err(|err| Error::InvalidDatafile(err.to_string()))
    }

    #[allow(missing_docs)]
    pub fn version(&self) -> &str {
        &self.wire.version
    }

    #[allow(missing_docs)]
    pub fn account_id(&self) -> &Str {
        &self.wire.account_id
    }

    #[allow(missing_docs)]
    pub fn project_id(&self) -> &Str {
        &self.wire.project_id
    }

    #[allow(missing_docs)]
    pub fn revision(&self) -> &Str {
        &self.wire.revision
    }

    #[allow(missing_docs)]
    pub fn sdk_key(&self) -> Option<&str> {
        self.wire.sdk_key.as_deref()
    }

    #[allow(missing_docs)]
    pub fn environment_key(&self) -> Option<&str> {
        self.wire.environment_key.as_deref()
    }

    /// Whether the IP address should be anonymized by the event ingest.
    pub fn anonymize_ip(&self) -> bool {
        self.wire.anonymize_ip
    }

    /// Bot filtering setting. `None` if the datafile does not configure it.
    pub fn bot_filtering(&self) -> Option<bool> {
        self.wire.bot_filtering
    }

    /// Whether impressions should be sent for rollout decisions too.
    pub fn send_flag_decisions(&self) -> bool {
        self.wire.send_flag_decisions
    }

    /// Return attribute id for attribute key.
    pub fn attribute_id(&self, key: &str) -> Option<&Str> {
        self.attribute_key_to_id.get(key)
    }

    #[allow(missing_docs)]
    pub fn attribute_by_id(&self, id: &str) -> Result<&Attribute> {
        self.attributes_by_id
            .get(id)
            .ok_or_else(|| Error::AttributeNotFound(id.to_owned()))
    }

    #[allow(missing_docs)]
    pub fn audience(&self, id: &str) -> Result<&Audience> {
        self.audiences
            .get(id)
            .ok_or_else(|| Error::AudienceNotFound(id.to_owned()))
    }

    #[allow(missing_docs)]
    pub fn event(&self, key: &str) -> Result<&Event> {
        self.events
            .get(key)
            .ok_or_else(|| Error::EventNotFound(key.to_owned()))
    }

    /// Find experiment by key. Rollout rules are not searched.
    pub fn experiment_by_key(&self, key: &str) -> Result<&Experiment> {
        self.experiment_key_to_id
            .get(key)
            .and_then(|id| self.experiments.get(id))
            .ok_or_else(|| Error::ExperimentNotFound(key.to_owned()))
    }

    /// Find experiment by id. Rollout rules are not searched.
    pub fn experiment_by_id(&self, id: &str) -> Option<&Experiment> {
        self.experiments.get(id)
    }

    /// Iterate experiments (including group experiments) in no particular order.
    pub fn experiments(&self) -> impl Iterator<Item = &Experiment> {
        self.experiments.values()
    }

    /// Features in datafile order.
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[allow(missing_docs)]
    pub fn feature(&self, key: &str) -> Result<&Feature> {
        self.feature_key_to_index
            .get(key)
            .map(|&idx| &self.features[idx])
            .ok_or_else(|| Error::FeatureNotFound(key.to_owned()))
    }

    #[allow(missing_docs)]
    pub fn feature_by_id(&self, id: &str) -> Option<&Feature> {
        self.feature_id_to_index.get(id).map(|&idx| &self.features[idx])
    }

    /// Find variable declared on a feature.
    pub fn variable(&self, feature_key: &str, variable_key: &str) -> Result<&Variable> {
        self.feature(feature_key)?
            .variable(variable_key)
            .ok_or_else(|| Error::VariableNotFound {
                feature_key: feature_key.to_owned(),
                variable_key: variable_key.to_owned(),
            })
    }

    /// Dereference feature tests of `feature` in evaluation order.
    pub fn feature_experiments<'a>(
        &'a self,
        feature: &'a Feature,
    ) -> impl Iterator<Item = &'a Experiment> + 'a {
        feature.experiment_ids.iter().filter_map(move |id| {
            let experiment = self.experiments.get(id);
            if experiment.is_none() {
                log::warn!(target: "optimizely", feature_key = feature.key, experiment_id = id;
                           "feature references unknown experiment");
            }
            experiment
        })
    }

    /// Dereference rollout of `feature`.
    pub fn feature_rollout(&self, feature: &Feature) -> Option<&Rollout> {
        if feature.rollout_id.is_empty() {
            return None;
        }
        self.rollouts.get(&feature.rollout_id)
    }

    #[allow(missing_docs)]
    pub fn rollout(&self, id: &str) -> Option<&Rollout> {
        self.rollouts.get(id)
    }

    #[allow(missing_docs)]
    pub fn group(&self, id: &str) -> Option<&Group> {
        self.groups.get(id)
    }

    /// Keys of features that use experiment `experiment_id` as a feature test.
    pub fn features_for_experiment(&self, experiment_id: &str) -> &[Str] {
        self.experiment_features
            .get(experiment_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every variation reachable from the flag through its feature tests and rollout.
    pub fn flag_variations(&self, flag_key: &str) -> &[Variation] {
        self.flag_variations
            .get(flag_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Find a variation reachable from the flag by key.
    pub fn flag_variation_by_key(&self, flag_key: &str, variation_key: &str) -> Option<&Variation> {
        self.flag_variations(flag_key)
            .iter()
            .find(|variation| variation.key == variation_key)
    }
}

impl std::str::FromStr for ProjectConfig {
    type Err = Error;

    fn from_str(json: &str) -> Result<ProjectConfig> {
        ProjectConfig::from_json(json.as_bytes())
    }
}

fn compile(wire: DatafileWire) -> Result<ProjectConfig> {
    let attributes_by_id: HashMap<Str, Attribute> = wire
        .attributes
        .iter()
        .map(|attribute| {
            (
                attribute.id.clone(),
                Attribute {
                    id: attribute.id.clone(),
                    key: attribute.key.clone(),
                },
            )
        })
        .collect();
    let attribute_key_to_id = wire
        .attributes
        .iter()
        .map(|attribute| (attribute.key.clone(), attribute.id.clone()))
        .collect();

    // Typed audiences replace legacy audiences with the same id.
    let audiences = wire
        .audiences
        .iter()
        .chain(wire.typed_audiences.iter())
        .map(|audience| (audience.id.clone(), compile_audience(audience)))
        .collect();

    let events = wire
        .events
        .iter()
        .map(|event| {
            (
                event.key.clone(),
                Event {
                    id: event.id.clone(),
                    key: event.key.clone(),
                    experiment_ids: event.experiment_ids.clone(),
                },
            )
        })
        .collect();

    let mut experiments = HashMap::new();
    for experiment in &wire.experiments {
        let compiled = compile_experiment(experiment, RuleKind::Experiment, None)?;
        experiments.insert(compiled.id.clone(), compiled);
    }

    let mut groups = HashMap::new();
    for group in &wire.groups {
        validate_ranges(&group.id, &group.traffic_allocation)?;
        for experiment in &group.experiments {
            let compiled =
                compile_experiment(experiment, RuleKind::Experiment, Some(group.id.clone()))?;
            experiments.insert(compiled.id.clone(), compiled);
        }
        groups.insert(
            group.id.clone(),
            Group {
                id: group.id.clone(),
                policy: group.policy,
                experiment_ids: group.experiments.iter().map(|e| e.id.clone()).collect(),
                traffic_allocation: group.traffic_allocation.clone(),
            },
        );
    }

    let experiment_key_to_id = experiments
        .values()
        .map(|experiment| (experiment.key.clone(), experiment.id.clone()))
        .collect();

    let mut rollouts = HashMap::new();
    for rollout in &wire.rollouts {
        let rules = rollout
            .experiments
            .iter()
            .map(|rule| compile_experiment(rule, RuleKind::Rollout, None))
            .collect::<Result<Vec<_>>>()?;
        rollouts.insert(
            rollout.id.clone(),
            Rollout {
                id: rollout.id.clone(),
                experiments: rules,
            },
        );
    }

    let features = wire
        .feature_flags
        .iter()
        .map(compile_feature)
        .collect::<Result<Vec<_>>>()?;
    let feature_key_to_index = features
        .iter()
        .enumerate()
        .map(|(idx, feature)| (feature.key.clone(), idx))
        .collect();
    let feature_id_to_index = features
        .iter()
        .enumerate()
        .map(|(idx, feature)| (feature.id.clone(), idx))
        .collect();

    let mut experiment_features: HashMap<Str, Vec<Str>> = HashMap::new();
    let mut flag_variations: HashMap<Str, Vec<Variation>> = HashMap::new();
    for feature in &features {
        for experiment_id in &feature.experiment_ids {
            experiment_features
                .entry(experiment_id.clone())
                .or_default()
                .push(feature.key.clone());
        }

        let rules = feature
            .experiment_ids
            .iter()
            .filter_map(|id| experiments.get(id))
            .chain(
                rollouts
                    .get(&feature.rollout_id)
                    .into_iter()
                    .flat_map(|rollout| rollout.experiments.iter()),
            );
        let mut seen = HashSet::new();
        let variations = rules
            .flat_map(|rule| rule.variations.iter())
            .filter(|variation| seen.insert(variation.id.clone()))
            .cloned()
            .collect();
        flag_variations.insert(feature.key.clone(), variations);
    }

    log::debug!(target: "optimizely", revision = wire.revision, features = features.len(),
                experiments = experiments.len(); "compiled datafile");

    Ok(ProjectConfig {
        wire,
        attributes_by_id,
        attribute_key_to_id,
        audiences,
        events,
        experiments,
        experiment_key_to_id,
        features,
        feature_key_to_index,
        feature_id_to_index,
        groups,
        rollouts,
        experiment_features,
        flag_variations,
    })
}

fn compile_audience(audience: &AudienceWire) -> Audience {
    let condition_tree = match ConditionTree::from_audience_conditions(&audience.conditions) {
        Ok(tree) => Some(tree),
        Err(err) => {
            log::warn!(target: "optimizely", audience_id = audience.id;
                       "failed to compile audience conditions: {err}");
            None
        }
    };
    Audience {
        id: audience.id.clone(),
        name: audience.name.clone(),
        conditions: audience.conditions.clone(),
        condition_tree,
    }
}

fn compile_experiment(
    experiment: &ExperimentWire,
    kind: RuleKind,
    group_id: Option<Str>,
) -> Result<Experiment> {
    validate_ranges(&experiment.id, &experiment.traffic_allocation)?;

    let explicit_conditions = experiment
        .audience_conditions
        .as_ref()
        .filter(|conditions| !is_empty_array(conditions));
    let audience_conditions = match explicit_conditions {
        Some(conditions) => Some(
            ConditionTree::from_experiment_conditions(conditions).map_err(|err| {
                Error::InvalidDatafile(format!(
                    "audience conditions of experiment {}: {err}",
                    experiment.key
                ))
            })?,
        ),
        None if !experiment.audience_ids.is_empty() => {
            Some(ConditionTree::any_of_audiences(&experiment.audience_ids))
        }
        None => None,
    };

    let variations = experiment
        .variations
        .iter()
        .map(|variation| Variation {
            id: variation.id.clone(),
            key: variation.key.clone(),
            feature_enabled: variation.feature_enabled,
            variables: variation
                .variables
                .iter()
                .map(|v| (v.id.clone(), v.value.clone()))
                .collect(),
        })
        .collect();

    Ok(Experiment {
        id: experiment.id.clone(),
        key: experiment.key.clone(),
        layer_id: experiment.layer_id.clone(),
        status: experiment.status,
        variations,
        traffic_allocation: experiment.traffic_allocation.clone(),
        audience_ids: experiment.audience_ids.clone(),
        audience_conditions,
        forced_variations: experiment.forced_variations.clone(),
        group_id,
        cmab: experiment.cmab.as_ref().map(|cmab| Cmab {
            attribute_ids: cmab.attribute_ids.clone(),
            traffic_allocation: cmab.traffic_allocation,
        }),
        kind,
    })
}

fn is_empty_array(value: &serde_json::Value) -> bool {
    matches!(value, serde_json::Value::Array(items) if items.is_empty())
}

fn compile_feature(feature: &FeatureFlagWire) -> Result<Feature> {
    let variables = feature
        .variables
        .iter()
        .map(compile_variable)
        .collect::<Result<Vec<_>>>()?;
    Ok(Feature {
        id: feature.id.clone(),
        key: feature.key.clone(),
        rollout_id: feature.rollout_id.clone(),
        experiment_ids: feature.experiment_ids.clone(),
        variables,
    })
}

fn compile_variable(variable: &VariableWire) -> Result<Variable> {
    let variable_type = match (variable.variable_type.as_str(), variable.sub_type.as_deref()) {
        ("string", Some("json")) | ("json", _) => VariableType::Json,
        ("string", _) => VariableType::String,
        ("boolean", _) => VariableType::Boolean,
        ("integer", _) => VariableType::Integer,
        ("double", _) => VariableType::Double,
        (other, _) => {
            return Err(Error::InvalidDatafile(format!(
                "variable {} has unknown type {other:?}",
                variable.key
            )))
        }
    };
    Ok(Variable {
        id: variable.id.clone(),
        key: variable.key.clone(),
        variable_type,
        default_value: variable.default_value.clone(),
    })
}

fn validate_ranges(owner_id: &str, ranges: &[Range]) -> Result<()> {
    let mut previous = 0;
    for range in ranges {
        if range.end_of_range > crate::bucketer::MAX_TRAFFIC_VALUE || range.end_of_range < previous
        {
            return Err(Error::InvalidDatafile(format!(
                "traffic allocation of {owner_id} is not a non-decreasing sequence in [0, 10000]"
            )));
        }
        previous = range.end_of_range;
    }
    Ok(())
}
