use std::collections::HashMap;

use crate::{
    decision::{DecideOption, ForcedDecisions, OptimizelyDecisionContext, OptimizelyForcedDecision},
    events::EventTags,
    user_context::UserContext,
    AttributeValue, Attributes, Client, Result,
};

use super::Decision;

/// A user bound to a [`Client`], exposing the decide API.
///
/// ```
/// # use optimizely::{Attributes, Client, DecideOption};
/// # fn test(client: &Client) {
/// let mut user = client.create_user_context("user-1", Attributes::new());
/// user.set_attribute("country", "US");
/// let decision = user.decide("checkout_flow", &[DecideOption::IncludeReasons]);
/// if decision.enabled {
///     println!("{:?}", decision.variables);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OptimizelyUserContext {
    client: Client,
    user: UserContext,
    forced_decisions: ForcedDecisions,
}

impl OptimizelyUserContext {
    pub(crate) fn new(client: Client, user: UserContext) -> OptimizelyUserContext {
        OptimizelyUserContext {
            client,
            user,
            forced_decisions: ForcedDecisions::default(),
        }
    }

    #[allow(missing_docs)]
    pub fn user_id(&self) -> &str {
        &self.user.id
    }

    #[allow(missing_docs)]
    pub fn attributes(&self) -> &Attributes {
        &self.user.attributes
    }

    /// Set attribute, replacing the previous value of `key`.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.user.attributes.insert(key.into(), value.into());
    }

    /// Replace segments the user qualifies for.
    pub fn set_qualified_segments(&mut self, segments: Vec<String>) {
        self.user.qualified_segments = segments;
    }

    #[allow(missing_docs)]
    pub fn qualified_segments(&self) -> &[String] {
        &self.user.qualified_segments
    }

    #[allow(missing_docs)]
    pub fn is_qualified_for(&self, segment: &str) -> bool {
        self.user.is_qualified_for(segment)
    }

    /// Decide `flag_key` for this user.
    ///
    /// Never fails: problems (unknown flag, missing config, CMAB errors) are reported in
    /// [`Decision::reasons`] of a disabled decision.
    pub fn decide(&self, flag_key: &str, options: &[DecideOption]) -> Decision {
        let options = self.client.default_decide_options().merged(options);
        self.client
            .decide(&self.user, &self.forced_decisions, flag_key, &options)
    }

    /// Decide every flag of `keys`.
    ///
    /// With [`DecideOption::EnabledFlagsOnly`], disabled flags are left out.
    pub fn decide_for_keys(
        &self,
        keys: &[&str],
        options: &[DecideOption],
    ) -> HashMap<String, Decision> {
        let options = self.client.default_decide_options().merged(options);
        self.client.decide_for_keys(
            &self.user,
            &self.forced_decisions,
            keys.iter().copied(),
            &options,
        )
    }

    /// Decide every flag of the datafile.
    pub fn decide_all(&self, options: &[DecideOption]) -> HashMap<String, Decision> {
        let options = self.client.default_decide_options().merged(options);
        self.client
            .decide_all(&self.user, &self.forced_decisions, &options)
    }

    /// Track a conversion of `event_key` for this user. See [`Client::track`].
    pub fn track_event(&self, event_key: &str, tags: EventTags) -> Result<()> {
        self.client.track(event_key, &self.user, tags)
    }

    /// Force a variation for a flag (or one of its rules) on this user context.
    ///
    /// The variation key is validated at decision time. Unknown keys are ignored.
    pub fn set_forced_decision(
        &mut self,
        context: OptimizelyDecisionContext,
        decision: OptimizelyForcedDecision,
    ) {
        self.forced_decisions.set(context, decision);
    }

    #[allow(missing_docs)]
    pub fn get_forced_decision(
        &self,
        context: &OptimizelyDecisionContext,
    ) -> Option<&OptimizelyForcedDecision> {
        self.forced_decisions.get(context)
    }

    /// Returns `false` if there was no forced decision for `context`.
    pub fn remove_forced_decision(&mut self, context: &OptimizelyDecisionContext) -> bool {
        self.forced_decisions.remove(context)
    }

    #[allow(missing_docs)]
    pub fn remove_all_forced_decisions(&mut self) {
        self.forced_decisions.clear();
    }
}
