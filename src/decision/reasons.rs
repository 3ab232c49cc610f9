/// Why a decision came out the way it did. Informational, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DecisionReason {
    BucketedIntoVariation,
    NotBucketedIntoVariation,
    BucketedVariationNotFound,
    DoesNotQualify,
    FailedRolloutTargeting,
    NoRolloutForFeature,
    RolloutHasNoExperiments,
    NotInGroup,
    WhitelistVariationAssignmentFound,
    InvalidWhitelistVariationAssignment,
    NoWhitelistVariationAssignment,
    DoesNotMeetRolloutTargeting,
    /// Variation set at runtime with `set_forced_variation`.
    ForcedVariationFound,
    InvalidForcedVariationAssignment,
    /// Variation set on the user context with `set_forced_decision`.
    ForcedDecisionFound,
    UserProfileVariationFound,
    ExperimentNotRunning,
    CmabFetchFailed,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DecisionReason::BucketedIntoVariation => "Bucketed into variation",
            DecisionReason::NotBucketedIntoVariation => "Not bucketed into a variation",
            DecisionReason::BucketedVariationNotFound => "Bucketed variation not found",
            DecisionReason::DoesNotQualify => "User does not qualify for the experiment",
            DecisionReason::FailedRolloutTargeting => "Failed rollout targeting",
            DecisionReason::NoRolloutForFeature => "No rollout for feature",
            DecisionReason::RolloutHasNoExperiments => "Rollout has no experiments",
            DecisionReason::NotInGroup => "User is not in the experiment's group",
            DecisionReason::WhitelistVariationAssignmentFound => {
                "Whitelist variation assignment found"
            }
            DecisionReason::InvalidWhitelistVariationAssignment => {
                "Invalid whitelist variation assignment"
            }
            DecisionReason::NoWhitelistVariationAssignment => "No whitelist variation assignment",
            DecisionReason::DoesNotMeetRolloutTargeting => "Does not meet rollout targeting",
            DecisionReason::ForcedVariationFound => "Forced variation found",
            DecisionReason::InvalidForcedVariationAssignment => {
                "Invalid forced variation assignment"
            }
            DecisionReason::ForcedDecisionFound => "Forced decision found",
            DecisionReason::UserProfileVariationFound => "User profile variation found",
            DecisionReason::ExperimentNotRunning => "Experiment is not running",
            DecisionReason::CmabFetchFailed => "Failed to fetch CMAB decision",
        })
    }
}

/// Collects human-readable messages explaining a decision.
///
/// Errors are always kept. Informational messages are kept only when the caller asked for them
/// with [`DecideOption::IncludeReasons`](crate::DecideOption::IncludeReasons). Every message is
/// logged either way.
#[derive(Debug, Default)]
pub(crate) struct DecisionReasons {
    include_infos: bool,
    errors: Vec<String>,
    infos: Vec<String>,
}

impl DecisionReasons {
    pub fn new(include_infos: bool) -> DecisionReasons {
        DecisionReasons {
            include_infos,
            ..Default::default()
        }
    }

    pub fn add_info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::trace!(target: "optimizely", "{message}");
        if self.include_infos {
            self.infos.push(message);
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!(target: "optimizely", "{message}");
        self.errors.push(message);
    }

    /// Errors first, then informational messages.
    pub fn into_messages(self) -> Vec<String> {
        let mut messages = self.errors;
        messages.extend(self.infos);
        messages
    }
}
