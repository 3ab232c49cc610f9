//! Thread-safe holder of the currently published [`ProjectConfig`].
use std::sync::{Arc, RwLock};

use crate::datafile::ProjectConfig;

/// `ProjectConfigStore` allows concurrent access for readers (decisions) and writers (config
/// managers).
///
/// `ProjectConfig` itself is immutable and can only be replaced completely. Readers hold the lock
/// only to clone the pointer.
#[derive(Debug, Default)]
pub struct ProjectConfigStore {
    config: RwLock<Option<Arc<ProjectConfig>>>,
}

impl ProjectConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        ProjectConfigStore::default()
    }

    /// Get the currently published config. Returns `None` if no config has been published yet.
    pub fn get(&self) -> Option<Arc<ProjectConfig>> {
        // Err() is possible only if the lock is poisoned (writer panicked while holding the
        // lock), which should never happen.
        self.config
            .read()
            .expect("thread holding project config lock should not panic")
            .clone()
    }

    /// Publish `config`. Returns the previously published config.
    pub fn set(&self, config: Arc<ProjectConfig>) -> Option<Arc<ProjectConfig>> {
        let mut slot = self
            .config
            .write()
            .expect("thread holding project config lock should not panic");
        slot.replace(config)
    }
}
