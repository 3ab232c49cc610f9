//! Runtime forced variations.
use std::{collections::HashMap, sync::RwLock};

/// Identifies a forced variation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub struct ExperimentOverrideKey {
    pub experiment_key: String,
    pub user_id: String,
}

impl ExperimentOverrideKey {
    #[allow(missing_docs)]
    pub fn new(experiment_key: impl Into<String>, user_id: impl Into<String>) -> Self {
        ExperimentOverrideKey {
            experiment_key: experiment_key.into(),
            user_id: user_id.into(),
        }
    }
}

/// Source of forced variations consulted before the datafile whitelist.
pub trait ExperimentOverrideStore: Send + Sync {
    /// Return the forced variation key, if any.
    fn get_variation(&self, key: &ExperimentOverrideKey) -> Option<String>;
}

/// Thread-safe in-memory [`ExperimentOverrideStore`] that can be modified at runtime.
#[derive(Debug, Default)]
pub struct MapExperimentOverridesStore {
    overrides: RwLock<HashMap<ExperimentOverrideKey, String>>,
}

impl MapExperimentOverridesStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        MapExperimentOverridesStore::default()
    }

    /// Force `variation_key` for the key, replacing any previous override.
    pub fn set_variation(&self, key: ExperimentOverrideKey, variation_key: impl Into<String>) {
        self.overrides
            .write()
            .expect("thread holding overrides lock should not panic")
            .insert(key, variation_key.into());
    }

    /// Remove the override. Returns `true` if it existed.
    pub fn remove_variation(&self, key: &ExperimentOverrideKey) -> bool {
        self.overrides
            .write()
            .expect("thread holding overrides lock should not panic")
            .remove(key)
            .is_some()
    }
}

impl ExperimentOverrideStore for MapExperimentOverridesStore {
    fn get_variation(&self, key: &ExperimentOverrideKey) -> Option<String> {
        self.overrides
            .read()
            .expect("thread holding overrides lock should not panic")
            .get(key)
            .cloned()
    }
}
