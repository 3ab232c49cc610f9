//! Contextual multi-armed bandit (CMAB) decisions.
//!
//! Variations of CMAB experiments are picked by a remote predictor from a subset of user
//! attributes. Predictions are cached per user and rule until the forwarded attributes change.
use std::{collections::BTreeMap, sync::Arc, time::Duration};

use crate::{
    bucketer, datafile::ProjectConfig, decision::DecideOptions, execution::ExecutionContext,
    user_context::UserContext, AttributeValue, Error, Result, Str,
};

mod cache;
mod client;

pub use cache::{CmabCache, CmabCacheValue, LruCmabCache};
pub use client::{CmabClient, DefaultCmabClient, RetryConfig, DEFAULT_PREDICTION_ENDPOINT};

/// Attributes forwarded to the predictor, keyed by attribute id.
///
/// Ordered, so the serialized form is canonical.
pub type CmabAttributes = BTreeMap<Str, AttributeValue>;

/// Variation assigned by the predictor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmabDecision {
    #[allow(missing_docs)]
    pub variation_id: String,
    /// Identifier of the prediction, reported with the impression.
    pub cmab_uuid: String,
}

/// Source of CMAB decisions.
pub trait CmabService: Send + Sync {
    /// Decide variation of CMAB experiment `rule_id` for `user`.
    fn get_decision(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        rule_id: &str,
        options: &DecideOptions,
    ) -> Result<CmabDecision>;
}

/// Settings of the default CMAB service.
#[derive(Debug, Clone)]
pub struct CmabConfig {
    /// Maximum number of cached decisions. Zero disables caching.
    pub cache_size: usize,
    /// Time-to-live of cached decisions. Zero means decisions never expire.
    pub cache_ttl: Duration,
    /// Prediction endpoint template, `%s` is replaced with the rule id.
    pub prediction_endpoint: String,
    /// Timeout of one prediction request.
    pub request_timeout: Duration,
    /// Retry policy. `None` means exactly one attempt.
    pub retry: Option<RetryConfig>,
}

impl CmabConfig {
    /// Default maximum number of cached decisions.
    pub const DEFAULT_CACHE_SIZE: usize = 1000;
    /// Default time-to-live of cached decisions.
    pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
    /// Default timeout of one prediction request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    #[allow(missing_docs)]
    pub fn new() -> CmabConfig {
        CmabConfig::default()
    }

    #[allow(missing_docs)]
    pub fn cache_size(mut self, cache_size: usize) -> CmabConfig {
        self.cache_size = cache_size;
        self
    }

    #[allow(missing_docs)]
    pub fn cache_ttl(mut self, cache_ttl: Duration) -> CmabConfig {
        self.cache_ttl = cache_ttl;
        self
    }

    #[allow(missing_docs)]
    pub fn prediction_endpoint(mut self, endpoint: impl Into<String>) -> CmabConfig {
        self.prediction_endpoint = endpoint.into();
        self
    }

    #[allow(missing_docs)]
    pub fn request_timeout(mut self, timeout: Duration) -> CmabConfig {
        self.request_timeout = timeout;
        self
    }

    #[allow(missing_docs)]
    pub fn retry(mut self, retry: Option<RetryConfig>) -> CmabConfig {
        self.retry = retry;
        self
    }

    /// Build the default service with an in-memory LRU cache and the HTTP client, whose
    /// requests run on a worker of `execution`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or its worker cannot be started.
    pub fn to_service(&self, execution: &ExecutionContext) -> Result<DefaultCmabService> {
        let cache = LruCmabCache::new(self.cache_size, self.cache_ttl);
        let client = DefaultCmabClient::start(
            self.prediction_endpoint.clone(),
            self.request_timeout,
            self.retry.clone(),
            execution,
        )?;
        Ok(DefaultCmabService::new(Arc::new(cache), Arc::new(client)))
    }
}

impl Default for CmabConfig {
    fn default() -> Self {
        CmabConfig {
            cache_size: Self::DEFAULT_CACHE_SIZE,
            cache_ttl: Self::DEFAULT_CACHE_TTL,
            prediction_endpoint: DEFAULT_PREDICTION_ENDPOINT.to_owned(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            retry: Some(RetryConfig::default()),
        }
    }
}

/// [`CmabService`] fronting a [`CmabClient`] with a [`CmabCache`].
#[derive(Clone)]
pub struct DefaultCmabService {
    cache: Arc<dyn CmabCache>,
    client: Arc<dyn CmabClient>,
}

impl DefaultCmabService {
    #[allow(missing_docs)]
    pub fn new(cache: Arc<dyn CmabCache>, client: Arc<dyn CmabClient>) -> DefaultCmabService {
        DefaultCmabService { cache, client }
    }

    fn fetch(
        &self,
        rule_id: &str,
        user: &UserContext,
        attributes: &CmabAttributes,
    ) -> Result<CmabDecision> {
        let cmab_uuid = uuid::Uuid::new_v4().to_string();
        let variation_id = self
            .client
            .fetch_decision(rule_id, &user.id, attributes, &cmab_uuid)?;
        Ok(CmabDecision {
            variation_id,
            cmab_uuid,
        })
    }
}

impl CmabService for DefaultCmabService {
    fn get_decision(
        &self,
        config: &ProjectConfig,
        user: &UserContext,
        rule_id: &str,
        options: &DecideOptions,
    ) -> Result<CmabDecision> {
        let rule = config
            .experiment_by_id(rule_id)
            .ok_or_else(|| Error::ExperimentNotFound(rule_id.to_owned()))?;
        let attribute_ids = rule.cmab.as_ref().map(|cmab| &cmab.attribute_ids[..]);
        let attributes = filter_attributes(config, user, attribute_ids);

        if options.ignore_cmab_cache {
            return self.fetch(rule_id, user, &attributes);
        }

        if options.reset_cmab_cache {
            self.cache.reset();
        }

        let key = cache_key(&user.id, rule_id);
        if options.invalidate_user_cmab_cache {
            self.cache.remove(&key);
        }

        let attributes_hash = hash_attributes(&attributes);
        if let Some(cached) = self.cache.lookup(&key) {
            if cached.attributes_hash == attributes_hash {
                log::trace!(target: "optimizely", rule_id, user_id = user.id.as_str();
                            "using cached CMAB decision");
                return Ok(CmabDecision {
                    variation_id: cached.variation_id,
                    cmab_uuid: cached.cmab_uuid,
                });
            }
            self.cache.remove(&key);
        }

        let decision = self.fetch(rule_id, user, &attributes)?;
        self.cache.save(
            key,
            CmabCacheValue {
                attributes_hash,
                variation_id: decision.variation_id.clone(),
                cmab_uuid: decision.cmab_uuid.clone(),
            },
        );
        Ok(decision)
    }
}

/// Cache key of a user and rule. The length prefix keeps keys unambiguous when user ids contain
/// the separator.
pub(crate) fn cache_key(user_id: &str, rule_id: &str) -> String {
    format!("{}:{}:{}", user_id.len(), user_id, rule_id)
}

/// Select user attributes listed in `attribute_ids`. Attributes unknown to the datafile or
/// missing from the user are skipped.
pub(crate) fn filter_attributes(
    config: &ProjectConfig,
    user: &UserContext,
    attribute_ids: Option<&[Str]>,
) -> CmabAttributes {
    attribute_ids
        .unwrap_or_default()
        .iter()
        .filter_map(|id| {
            let attribute = match config.attribute_by_id(id) {
                Ok(attribute) => attribute,
                Err(err) => {
                    log::debug!(target: "optimizely", "skipping CMAB attribute: {err}");
                    return None;
                }
            };
            let value = user.attributes.get(attribute.key.as_str())?;
            Some((id.clone(), value.clone()))
        })
        .collect()
}

/// Hash of the canonical JSON form of `attributes`.
pub(crate) fn hash_attributes(attributes: &CmabAttributes) -> u32 {
    let json: serde_json::Map<String, serde_json::Value> = attributes
        .iter()
        .map(|(id, value)| (id.to_string(), value.to_json()))
        .collect();
    bucketer::hash(serde_json::Value::Object(json).to_string())
}
