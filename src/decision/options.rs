use serde::{Deserialize, Serialize};

/// Options altering a single `decide` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecideOption {
    /// Do not send an impression for this decision.
    DisableDecisionEvent,
    /// Only return decisions for enabled flags (`decide_all`/`decide_for_keys`).
    EnabledFlagsOnly,
    /// Include informational messages in decision reasons. Errors are always included.
    IncludeReasons,
    /// Do not evaluate variables.
    ExcludeVariables,
    /// Neither read nor write the CMAB cache.
    IgnoreCmabCache,
    /// Clear the whole CMAB cache before deciding.
    ResetCmabCache,
    /// Drop cached CMAB decisions of this user before deciding.
    InvalidateUserCmabCache,
    /// Bypass the user profile service for lookup and save.
    IgnoreUserProfileService,
}

/// A set of [`DecideOption`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DecideOptions {
    pub disable_decision_event: bool,
    pub enabled_flags_only: bool,
    pub include_reasons: bool,
    pub exclude_variables: bool,
    pub ignore_cmab_cache: bool,
    pub reset_cmab_cache: bool,
    pub invalidate_user_cmab_cache: bool,
    pub ignore_user_profile_service: bool,
}

impl DecideOptions {
    /// Add an option to the set.
    pub fn insert(&mut self, option: DecideOption) {
        let slot = match option {
            DecideOption::DisableDecisionEvent => &mut self.disable_decision_event,
            DecideOption::EnabledFlagsOnly => &mut self.enabled_flags_only,
            DecideOption::IncludeReasons => &mut self.include_reasons,
            DecideOption::ExcludeVariables => &mut self.exclude_variables,
            DecideOption::IgnoreCmabCache => &mut self.ignore_cmab_cache,
            DecideOption::ResetCmabCache => &mut self.reset_cmab_cache,
            DecideOption::InvalidateUserCmabCache => &mut self.invalidate_user_cmab_cache,
            DecideOption::IgnoreUserProfileService => &mut self.ignore_user_profile_service,
        };
        *slot = true;
    }

    /// Union of two option sets.
    pub fn merged<'a>(&self, options: impl IntoIterator<Item = &'a DecideOption>) -> DecideOptions {
        let mut merged = *self;
        merged.extend(options.into_iter().copied());
        merged
    }
}

impl Extend<DecideOption> for DecideOptions {
    fn extend<T: IntoIterator<Item = DecideOption>>(&mut self, iter: T) {
        for option in iter {
            self.insert(option);
        }
    }
}

impl FromIterator<DecideOption> for DecideOptions {
    fn from_iter<T: IntoIterator<Item = DecideOption>>(iter: T) -> Self {
        let mut options = DecideOptions::default();
        options.extend(iter);
        options
    }
}
