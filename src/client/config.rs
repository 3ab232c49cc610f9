use std::{sync::Arc, time::Duration};

use crate::{
    cmab::{CmabConfig, CmabService},
    config::{
        PollingConfig, ProjectConfigManager, RequesterConfig, DEFAULT_DATAFILE_URL_TEMPLATE,
    },
    decision::{DecideOption, DecideOptions, UserProfileService},
    events::{BatchEventProcessorConfig, EventDispatcher, EventProcessor},
    Client, Result,
};

/// Configuration for [`Client`].
///
/// At least one source of the project config is required: an SDK key (polled from the CDN), a
/// datafile, or a custom [`ProjectConfigManager`]. If both an SDK key and a datafile are given,
/// the datafile is served until the first successful poll.
pub struct ClientConfig {
    pub(crate) sdk_key: Option<String>,
    pub(crate) datafile: Option<Vec<u8>>,
    pub(crate) datafile_url_template: String,
    pub(crate) polling_interval: Duration,
    pub(crate) polling_jitter: Duration,
    pub(crate) requester: RequesterConfig,
    pub(crate) config_manager: Option<Arc<dyn ProjectConfigManager>>,
    pub(crate) event_processor_config: BatchEventProcessorConfig,
    pub(crate) event_dispatcher: Option<Arc<dyn EventDispatcher>>,
    pub(crate) event_processor: Option<Arc<dyn EventProcessor>>,
    pub(crate) user_profile_service: Option<Arc<dyn UserProfileService>>,
    pub(crate) cmab_config: CmabConfig,
    pub(crate) cmab_service: Option<Arc<dyn CmabService>>,
    pub(crate) default_decide_options: DecideOptions,
}

impl ClientConfig {
    /// Create a default configuration polling the datafile of `sdk_key`.
    ///
    /// ```
    /// # use optimizely::ClientConfig;
    /// ClientConfig::from_sdk_key("sdk-key");
    /// ```
    pub fn from_sdk_key(sdk_key: impl Into<String>) -> ClientConfig {
        ClientConfig {
            sdk_key: Some(sdk_key.into()),
            ..ClientConfig::empty()
        }
    }

    /// Create a configuration serving a fixed datafile. Nothing is polled.
    pub fn from_datafile(datafile: impl Into<Vec<u8>>) -> ClientConfig {
        ClientConfig {
            datafile: Some(datafile.into()),
            ..ClientConfig::empty()
        }
    }

    /// Create a configuration using a custom source of project configs.
    pub fn from_config_manager(config_manager: Arc<dyn ProjectConfigManager>) -> ClientConfig {
        ClientConfig {
            config_manager: Some(config_manager),
            ..ClientConfig::empty()
        }
    }

    fn empty() -> ClientConfig {
        ClientConfig {
            sdk_key: None,
            datafile: None,
            datafile_url_template: DEFAULT_DATAFILE_URL_TEMPLATE.to_owned(),
            polling_interval: PollingConfig::DEFAULT_POLLING_INTERVAL,
            polling_jitter: PollingConfig::DEFAULT_JITTER,
            requester: RequesterConfig::default(),
            config_manager: None,
            event_processor_config: BatchEventProcessorConfig::default(),
            event_dispatcher: None,
            event_processor: None,
            user_profile_service: None,
            cmab_config: CmabConfig::default(),
            cmab_service: None,
            default_decide_options: DecideOptions::default(),
        }
    }

    /// Datafile served until the first poll succeeds (or forever, without an SDK key).
    pub fn datafile(mut self, datafile: impl Into<Vec<u8>>) -> ClientConfig {
        self.datafile = Some(datafile.into());
        self
    }

    /// Override datafile URL template. `%s` is replaced with the SDK key. Clients should use the
    /// default setting in most cases.
    pub fn datafile_url_template(mut self, template: impl Into<String>) -> ClientConfig {
        self.datafile_url_template = template.into();
        self
    }

    /// Set how often the datafile is polled.
    ///
    /// Defaults to [`PollingConfig::DEFAULT_POLLING_INTERVAL`].
    pub fn polling_interval(mut self, interval: Duration) -> ClientConfig {
        self.polling_interval = interval;
        self
    }

    /// Set the maximum random amount subtracted from each polling interval.
    pub fn polling_jitter(mut self, jitter: Duration) -> ClientConfig {
        self.polling_jitter = jitter;
        self
    }

    #[allow(missing_docs)]
    pub fn requester(mut self, requester: RequesterConfig) -> ClientConfig {
        self.requester = requester;
        self
    }

    /// Configure the default batching event processor.
    pub fn event_processor_config(mut self, config: BatchEventProcessorConfig) -> ClientConfig {
        self.event_processor_config = config;
        self
    }

    /// Send event batches with `dispatcher` instead of the HTTP dispatcher.
    pub fn event_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> ClientConfig {
        self.event_dispatcher = Some(dispatcher);
        self
    }

    /// Replace the batching event processor. The event dispatcher is not used then.
    pub fn event_processor(mut self, processor: Arc<dyn EventProcessor>) -> ClientConfig {
        self.event_processor = Some(processor);
        self
    }

    /// Enable sticky bucketing.
    pub fn user_profile_service(mut self, service: Arc<dyn UserProfileService>) -> ClientConfig {
        self.user_profile_service = Some(service);
        self
    }

    /// Configure the default CMAB service.
    pub fn cmab_config(mut self, config: CmabConfig) -> ClientConfig {
        self.cmab_config = config;
        self
    }

    /// Replace the default CMAB service.
    pub fn cmab_service(mut self, service: Arc<dyn CmabService>) -> ClientConfig {
        self.cmab_service = Some(service);
        self
    }

    /// Options applied to every `decide` call, in addition to per-call options.
    pub fn default_decide_options(
        mut self,
        options: impl IntoIterator<Item = DecideOption>,
    ) -> ClientConfig {
        self.default_decide_options = options.into_iter().collect();
        self
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// Background workers (datafile poller, event batching) are started immediately.
    ///
    /// ```
    /// # use optimizely::{Client, ClientConfig};
    /// # fn main() -> optimizely::Result<()> {
    /// let datafile = r#"{"version": "4", "accountId": "1", "projectId": "2", "revision": "3",
    ///     "experiments": [], "audiences": [], "featureFlags": [], "events": [],
    ///     "attributes": [], "groups": [], "rollouts": []}"#;
    /// let client: Client = ClientConfig::from_datafile(datafile).to_client()?;
    /// client.close()?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if no config source is set, the datafile is invalid, or a worker fails to
    /// start.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}
