use std::sync::Arc;

use crate::{
    datafile::ProjectConfig,
    notification::{Notification, NotificationCenter, ProjectConfigUpdateNotification},
    Error, Result,
};

use super::{datafile_url, fetch_blocking, ProjectConfigManager, RequesterConfig};

/// [`ProjectConfigManager`] serving a single config for its whole lifetime.
#[derive(Debug, Clone)]
pub struct StaticProjectConfigManager {
    config: Arc<ProjectConfig>,
}

impl StaticProjectConfigManager {
    /// Parse `datafile` and serve it.
    ///
    /// # Errors
    ///
    /// Returns an error if the datafile is invalid or of an unsupported version.
    pub fn from_datafile(datafile: &[u8]) -> Result<StaticProjectConfigManager> {
        Ok(StaticProjectConfigManager::from_config(Arc::new(
            ProjectConfig::from_json(datafile)?,
        )))
    }

    /// Serve an already parsed config.
    pub fn from_config(config: Arc<ProjectConfig>) -> StaticProjectConfigManager {
        StaticProjectConfigManager { config }
    }

    /// Fetch the datafile of `sdk_key` once and serve it. Blocks the calling thread.
    ///
    /// A `ProjectConfigUpdate` notification is sent through `notification_center`, if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the datafile cannot be fetched or parsed.
    pub fn from_url(
        sdk_key: &str,
        url_template: &str,
        requester: &RequesterConfig,
        notification_center: Option<&NotificationCenter>,
    ) -> Result<StaticProjectConfigManager> {
        let url = datafile_url(url_template, sdk_key)?;
        log::debug!(target: "optimizely", url = url.as_str(); "fetching datafile");
        // Blocking reqwest must not run on an async runtime thread.
        let body = std::thread::scope(|scope| {
            scope
                .spawn(|| fetch_blocking(&url, requester))
                .join()
                .map_err(|_| Error::WorkerPanicked)
        })??;
        let manager = StaticProjectConfigManager::from_datafile(&body)?;

        log::info!(target: "optimizely", revision = manager.config.revision();
                   "loaded project config");
        if let Some(notification_center) = notification_center {
            notification_center.send(&Notification::ProjectConfigUpdate(
                ProjectConfigUpdateNotification {
                    revision: manager.config.revision().clone(),
                },
            ));
        }
        Ok(manager)
    }
}

impl ProjectConfigManager for StaticProjectConfigManager {
    fn get_config(&self) -> Result<Arc<ProjectConfig>> {
        Ok(self.config.clone())
    }
}
