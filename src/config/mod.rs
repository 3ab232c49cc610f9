//! Project config managers.
//!
//! A manager owns the lifecycle of the [`ProjectConfig`] the client decides with. The static
//! manager publishes one config forever. The polling manager refreshes it in the background and
//! announces every new revision through the notification center.
use std::sync::Arc;

use crate::{datafile::ProjectConfig, Result};

mod polling;
mod requester;
mod static_manager;
mod store;

pub use polling::{PollingConfig, PollingMetrics, PollingProjectConfigManager};
pub use requester::{
    datafile_url, fetch_blocking, DatafileResponse, Requester, RequesterConfig,
};
pub use static_manager::StaticProjectConfigManager;
pub use store::ProjectConfigStore;

/// Default CDN URL template. `%s` is replaced with the SDK key.
pub const DEFAULT_DATAFILE_URL_TEMPLATE: &str = "https://cdn.optimizely.com/datafiles/%s.json";

/// Source of the current project config.
pub trait ProjectConfigManager: Send + Sync {
    /// Return the currently published config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`](crate::Error::ConfigurationMissing) if no config
    /// has been published yet.
    fn get_config(&self) -> Result<Arc<ProjectConfig>>;

    /// Block until the first config is published or the manager fails unrecoverably.
    fn wait_for_configuration(&self) -> Result<()> {
        self.get_config().map(drop)
    }
}
