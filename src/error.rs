use std::sync::Arc;

use crate::entities::VariableType;

/// Represents a result type for operations in the Optimizely SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// SDK-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Optimizely SDK.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The datafile cannot be decoded or misses required entities.
    #[error("invalid datafile: {0}")]
    InvalidDatafile(String),

    /// The datafile was decoded but its schema version is not supported by this SDK.
    #[error("unsupported datafile version: {0}")]
    UnsupportedDatafileVersion(String),

    /// No project config has been published yet.
    #[error("project config is not available yet")]
    ConfigurationMissing,

    /// Requested feature flag does not exist in the current datafile.
    #[error("feature not found: {0}")]
    FeatureNotFound(String),

    /// Requested experiment does not exist in the current datafile.
    #[error("experiment not found: {0}")]
    ExperimentNotFound(String),

    /// Requested event does not exist in the current datafile.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Requested variable does not exist on the feature.
    #[error("variable {variable_key} not found on feature {feature_key}")]
    VariableNotFound {
        /// Key of the feature the variable was looked up on.
        feature_key: String,
        /// Key of the missing variable.
        variable_key: String,
    },

    /// Requested variation does not exist on the experiment.
    #[error("variation {variation_key} not found on experiment {experiment_key}")]
    VariationNotFound {
        /// Key of the experiment the variation was looked up on.
        experiment_key: String,
        /// Key of the missing variation.
        variation_key: String,
    },

    /// Audience referenced by a condition does not exist.
    #[error("audience not found: {0}")]
    AudienceNotFound(String),

    /// Attribute referenced by key or id does not exist.
    #[error("attribute not found: {0}")]
    AttributeNotFound(String),

    /// Caller passed an invalid argument (empty user id, empty key, etc.).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A typed variable getter was called for a variable of another type.
    #[error("variable type mismatch (expected: {expected:?}, found: {found:?})")]
    VariableTypeMismatch {
        /// Type requested by the caller.
        expected: VariableType,
        /// Type declared in the datafile.
        found: VariableType,
    },

    /// A variable value could not be coerced to its declared type.
    #[error("value {value:?} cannot be converted to {variable_type:?}")]
    InvalidAttributeValueType {
        /// Raw value from the datafile.
        value: String,
        /// Declared variable type.
        variable_type: VariableType,
    },

    /// An URL could not be built from the configured template.
    #[error("invalid url")]
    InvalidUrl(#[source] url::ParseError),

    /// Server responded with a non-success status code.
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus {
        /// Status code received.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// Remote CMAB predictor did not return a decision after all retries.
    #[error("failed to fetch CMAB data for experiment {rule_key}")]
    CmabFetchFailed {
        /// Key of the CMAB experiment.
        rule_key: String,
    },

    /// Remote CMAB predictor returned a response without a variation.
    #[error("invalid CMAB prediction response: {0}")]
    InvalidCmabResponse(String),

    /// No notification handler registered under the given id.
    #[error("notification handler {0} not found")]
    NotificationHandlerNotFound(u64),

    /// The client has been closed.
    #[error("client is closed")]
    ClientClosed,

    /// A background worker panicked. This should normally never happen.
    #[error("background worker panicked")]
    WorkerPanicked,

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<url::ParseError> for Error {
    fn from(value: url::ParseError) -> Self {
        Error::InvalidUrl(value)
    }
}
