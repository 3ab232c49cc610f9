//! Sticky bucketing through a user-provided profile store.
use std::{collections::HashMap, sync::Mutex};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Saved decisions of one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[allow(missing_docs)]
    pub user_id: String,
    /// Experiment id -> variation id.
    pub experiment_bucket_map: HashMap<String, String>,
}

impl UserProfile {
    #[allow(missing_docs)]
    pub fn new(user_id: impl Into<String>) -> UserProfile {
        UserProfile {
            user_id: user_id.into(),
            experiment_bucket_map: HashMap::new(),
        }
    }

    /// Return saved variation id for the experiment.
    pub fn variation_for_experiment(&self, experiment_id: &str) -> Option<&str> {
        self.experiment_bucket_map
            .get(experiment_id)
            .map(String::as_str)
    }
}

/// Persistent storage of [`UserProfile`]s.
///
/// When installed, a user keeps the variation they were first bucketed into even if traffic
/// allocation changes later.
pub trait UserProfileService: Send + Sync {
    /// Load profile of the user. `None` if there is none.
    fn lookup(&self, user_id: &str) -> Option<UserProfile>;

    /// Store the profile, replacing the previous one.
    fn save(&self, profile: UserProfile) -> Result<()>;
}

/// [`UserProfileService`] keeping profiles in memory.
#[derive(Debug, Default)]
pub struct InMemoryUserProfileService {
    profiles: Mutex<HashMap<String, UserProfile>>,
}

impl InMemoryUserProfileService {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        InMemoryUserProfileService::default()
    }
}

impl UserProfileService for InMemoryUserProfileService {
    fn lookup(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles
            .lock()
            .expect("thread holding profiles lock should not panic")
            .get(user_id)
            .cloned()
    }

    fn save(&self, profile: UserProfile) -> Result<()> {
        self.profiles
            .lock()
            .expect("thread holding profiles lock should not panic")
            .insert(profile.user_id.clone(), profile);
        Ok(())
    }
}
