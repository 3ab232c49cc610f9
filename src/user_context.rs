use crate::{AttributeValue, Attributes};

/// Reserved attribute overriding the id used for bucketing.
pub const BUCKETING_ID_ATTRIBUTE: &str = "$opt_bucketing_id";

/// Reserved attribute carrying the user agent. Forwarded to events like other `$opt_` attributes.
pub const USER_AGENT_ATTRIBUTE: &str = "$opt_user_agent";

/// The user a decision is made for.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserContext {
    /// Non-empty user id.
    pub id: String,
    /// User attributes keyed by attribute key.
    pub attributes: Attributes,
    /// Externally computed segments, used by `qualified` conditions.
    pub qualified_segments: Vec<String>,
}

impl UserContext {
    #[allow(missing_docs)]
    pub fn new(id: impl Into<String>, attributes: Attributes) -> UserContext {
        UserContext {
            id: id.into(),
            attributes,
            qualified_segments: Vec::new(),
        }
    }

    /// Return the id used for bucketing.
    ///
    /// `$opt_bucketing_id` takes precedence over user id if it is a string. Any other type is
    /// ignored.
    pub fn bucketing_id(&self) -> &str {
        match self.attributes.get(BUCKETING_ID_ATTRIBUTE) {
            Some(AttributeValue::String(bucketing_id)) => bucketing_id,
            Some(other) => {
                log::warn!(target: "optimizely", user_id = self.id.as_str();
                           "bucketing id attribute is not a string ({other:?}), using user id");
                &self.id
            }
            None => &self.id,
        }
    }

    /// Check whether the user belongs to `segment`.
    pub fn is_qualified_for(&self, segment: &str) -> bool {
        self.qualified_segments.iter().any(|s| s == segment)
    }
}
