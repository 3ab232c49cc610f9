//! A project config manager that periodically refetches the datafile in the background.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Condvar, Mutex,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    datafile::ProjectConfig,
    execution::{Cancellation, ExecutionContext},
    notification::{Notification, NotificationCenter, ProjectConfigUpdateNotification},
    Error, Result,
};

use super::{
    datafile_url, DatafileResponse, ProjectConfigManager, ProjectConfigStore, Requester,
    RequesterConfig, DEFAULT_DATAFILE_URL_TEMPLATE,
};

/// Configuration for [`PollingProjectConfigManager`].
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// SDK key identifying the datafile.
    pub sdk_key: String,
    /// Datafile URL template, `%s` is replaced with the SDK key.
    ///
    /// Defaults to [`DEFAULT_DATAFILE_URL_TEMPLATE`].
    pub datafile_url_template: String,
    /// Datafile published before the first fetch completes.
    pub initial_datafile: Option<Vec<u8>>,
    /// Interval to wait between requests.
    ///
    /// Defaults to [`PollingConfig::DEFAULT_POLLING_INTERVAL`].
    pub polling_interval: Duration,
    /// Jitter applies a randomized duration to wait between requests. This helps to avoid
    /// multiple server instances synchronizing and producing spiky network load.
    ///
    /// Defaults to [`PollingConfig::DEFAULT_JITTER`].
    pub jitter: Duration,
    #[allow(missing_docs)]
    pub requester: RequesterConfig,
}

impl PollingConfig {
    /// Default value for [`PollingConfig::polling_interval`].
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5 * 60);
    /// Default value for [`PollingConfig::jitter`].
    pub const DEFAULT_JITTER: Duration = Duration::ZERO;

    /// Create a new `PollingConfig` for `sdk_key` using default configuration.
    pub fn new(sdk_key: impl Into<String>) -> PollingConfig {
        PollingConfig {
            sdk_key: sdk_key.into(),
            datafile_url_template: DEFAULT_DATAFILE_URL_TEMPLATE.to_owned(),
            initial_datafile: None,
            polling_interval: PollingConfig::DEFAULT_POLLING_INTERVAL,
            jitter: PollingConfig::DEFAULT_JITTER,
            requester: RequesterConfig::default(),
        }
    }

    #[allow(missing_docs)]
    pub fn with_datafile_url_template(mut self, template: impl Into<String>) -> PollingConfig {
        self.datafile_url_template = template.into();
        self
    }

    #[allow(missing_docs)]
    pub fn with_initial_datafile(mut self, datafile: impl Into<Vec<u8>>) -> PollingConfig {
        self.initial_datafile = Some(datafile.into());
        self
    }

    /// Update poll interval with `interval`.
    pub fn with_polling_interval(mut self, interval: Duration) -> PollingConfig {
        self.polling_interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollingConfig {
        self.jitter = jitter;
        self
    }

    #[allow(missing_docs)]
    pub fn with_requester(mut self, requester: RequesterConfig) -> PollingConfig {
        self.requester = requester;
        self
    }
}

/// Counters of the polling worker.
#[derive(Debug, Default)]
pub struct PollingMetrics {
    fetch_attempts: AtomicU64,
    fetch_failures: AtomicU64,
    decode_failures: AtomicU64,
    not_modified: AtomicU64,
    updates: AtomicU64,
}

impl PollingMetrics {
    /// Return current values keyed by counter name.
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        [
            ("fetch_attempts", &self.fetch_attempts),
            ("fetch_failures", &self.fetch_failures),
            ("decode_failures", &self.decode_failures),
            ("not_modified", &self.not_modified),
            ("updates", &self.updates),
        ]
        .into_iter()
        .map(|(name, counter)| (name, counter.load(Ordering::Relaxed)))
        .collect()
    }

    fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Shared {
    store: ProjectConfigStore,
    metrics: PollingMetrics,
    notification_center: Arc<NotificationCenter>,
    /// Holds `None` if no config has been published yet. Holds `Some(Ok(()))` once a config is
    /// published. Holds `Some(Err(...))` if fetching the first config failed unrecoverably.
    result: (Mutex<Option<Result<()>>>, Condvar),
}

impl Shared {
    fn new(notification_center: Arc<NotificationCenter>) -> Shared {
        Shared {
            store: ProjectConfigStore::new(),
            metrics: PollingMetrics::default(),
            notification_center,
            result: (Mutex::new(None), Condvar::new()),
        }
    }

    fn update_result(&self, value: Result<()>) {
        *self
            .result
            .0
            .lock()
            .expect("thread holding result lock should not panic") = Some(value);
        self.result.1.notify_all();
    }

    /// Record an unrecoverable error unless a config has already been published.
    fn fail_if_missing(&self, err: Error) {
        let mut result = self
            .result
            .0
            .lock()
            .expect("thread holding result lock should not panic");
        if !matches!(*result, Some(Ok(()))) {
            *result = Some(Err(err));
            self.result.1.notify_all();
        }
    }

    fn publish(&self, config: ProjectConfig) {
        let current = self.store.get();
        if current.is_some_and(|current| current.revision() == config.revision()) {
            log::debug!(target: "optimizely", revision = config.revision();
                        "datafile revision has not changed");
            self.update_result(Ok(()));
            return;
        }

        let revision = config.revision().clone();
        self.store.set(Arc::new(config));
        PollingMetrics::increment(&self.metrics.updates);
        self.update_result(Ok(()));

        log::info!(target: "optimizely", revision; "published new project config");
        self.notification_center
            .send(&Notification::ProjectConfigUpdate(
                ProjectConfigUpdateNotification { revision },
            ));
    }

    /// Process the outcome of one poll. Returns the new `Last-Modified` value, if any.
    fn handle_response(&self, response: Result<DatafileResponse>) -> Option<String> {
        PollingMetrics::increment(&self.metrics.fetch_attempts);
        match response {
            Ok(DatafileResponse::NotModified) => {
                PollingMetrics::increment(&self.metrics.not_modified);
                log::debug!(target: "optimizely", "datafile not modified");
                None
            }
            Ok(DatafileResponse::Modified {
                body,
                last_modified,
            }) => match ProjectConfig::from_json(&body) {
                Ok(config) => {
                    self.publish(config);
                    last_modified
                }
                Err(err) => {
                    PollingMetrics::increment(&self.metrics.decode_failures);
                    log::warn!(target: "optimizely", "failed to parse fetched datafile: {err}");
                    if matches!(err, Error::UnsupportedDatafileVersion(_)) {
                        self.fail_if_missing(err);
                    }
                    None
                }
            },
            Err(err) => {
                PollingMetrics::increment(&self.metrics.fetch_failures);
                log::warn!(target: "optimizely", "failed to fetch datafile: {err}");
                if matches!(err, Error::HttpStatus { status: 401 | 403, .. }) {
                    self.fail_if_missing(err);
                }
                None
            }
        }
    }
}

/// [`ProjectConfigManager`] refreshing the config on a background worker.
///
/// Each poll sends `If-Modified-Since` with the last seen `Last-Modified` value. Unchanged
/// datafiles and datafiles of the already published revision are not republished. Failures are
/// counted and logged, and the published config is kept.
#[derive(Clone)]
pub struct PollingProjectConfigManager {
    shared: Arc<Shared>,
}

impl PollingProjectConfigManager {
    /// Start polling within `execution`.
    ///
    /// If `config.initial_datafile` is set, it is parsed and published before this function
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the datafile URL is invalid or the worker could not be started.
    pub fn start(
        config: PollingConfig,
        notification_center: Arc<NotificationCenter>,
        execution: &ExecutionContext,
    ) -> Result<PollingProjectConfigManager> {
        let url = datafile_url(&config.datafile_url_template, &config.sdk_key)?;
        let requester = Requester::new(&config.requester)?;
        let shared = Arc::new(Shared::new(notification_center));

        if let Some(datafile) = &config.initial_datafile {
            match ProjectConfig::from_json(datafile) {
                Ok(project_config) => shared.publish(project_config),
                Err(err) => {
                    log::warn!(target: "optimizely", "ignoring invalid initial datafile: {err}")
                }
            }
        }

        {
            let shared = Arc::clone(&shared);
            let interval = config.polling_interval;
            let jitter_max = config.jitter;
            execution.go("optimizely-poller", move |cancellation| {
                poll(shared, requester, url, interval, jitter_max, cancellation)
            })?;
        }

        Ok(PollingProjectConfigManager { shared })
    }

    /// Return counters of the polling worker.
    pub fn metrics(&self) -> HashMap<&'static str, u64> {
        self.shared.metrics.snapshot()
    }
}

impl ProjectConfigManager for PollingProjectConfigManager {
    fn get_config(&self) -> Result<Arc<ProjectConfig>> {
        self.shared.store.get().ok_or(Error::ConfigurationMissing)
    }

    /// Waits for the first config to be published.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedDatafileVersion`] or [`Error::HttpStatus`] (unauthorized) if the
    ///   first config cannot be obtained.
    /// - [`Error::ClientClosed`] if the manager was stopped before any config was published.
    fn wait_for_configuration(&self) -> Result<()> {
        let mut lock = self
            .shared
            .result
            .0
            .lock()
            .map_err(|_| Error::WorkerPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = self
                        .shared
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::WorkerPanicked)?;
                }
            }
        }
    }
}

async fn poll(
    shared: Arc<Shared>,
    requester: Requester,
    url: reqwest::Url,
    interval: Duration,
    jitter_max: Duration,
    mut cancellation: Cancellation,
) {
    let mut last_modified: Option<String> = None;
    loop {
        log::debug!(target: "optimizely", url = url.as_str(); "fetching datafile");
        let response = tokio::select! {
            response = requester.fetch(&url, last_modified.as_deref()) => response,
            _ = cancellation.cancelled() => break,
        };
        if let Some(value) = shared.handle_response(response) {
            last_modified = Some(value);
        }

        let timeout = jitter(interval, jitter_max);
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {}
            _ = cancellation.cancelled() => break,
        }
    }

    log::debug!(target: "optimizely", "poller stopped");
    shared.fail_if_missing(Error::ClientClosed);
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::{jitter, PollingConfig, PollingProjectConfigManager, Shared};
    use crate::{
        config::{DatafileResponse, ProjectConfigManager},
        execution::ExecutionContext,
        notification::{Notification, NotificationCenter, NotificationType},
        test_utils::read_datafile_json,
        Error,
    };

    fn modified(name: &str) -> crate::Result<DatafileResponse> {
        Ok(DatafileResponse::Modified {
            body: read_datafile_json(name),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".to_owned()),
        })
    }

    fn recorded_revisions(center: &NotificationCenter) -> Arc<Mutex<Vec<String>>> {
        let revisions = Arc::new(Mutex::new(Vec::new()));
        let revisions_clone = revisions.clone();
        center.add(NotificationType::ProjectConfigUpdate, move |notification| {
            if let Notification::ProjectConfigUpdate(update) = notification {
                revisions_clone
                    .lock()
                    .unwrap()
                    .push(update.revision.to_string());
            }
        });
        revisions
    }

    #[test]
    fn publishes_new_revisions_only() {
        let _ = env_logger::builder().is_test(true).try_init();
        let center = Arc::new(NotificationCenter::new());
        let revisions = recorded_revisions(&center);
        let shared = Shared::new(center);

        assert_eq!(
            shared.handle_response(modified("decide.json")).as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
        assert_eq!(shared.store.get().unwrap().revision(), "241");

        // Same revision is not republished.
        let first = shared.store.get().unwrap();
        shared.handle_response(modified("decide.json"));
        assert!(Arc::ptr_eq(&first, &shared.store.get().unwrap()));

        shared.handle_response(modified("groups.json"));
        assert_eq!(shared.store.get().unwrap().revision(), "15");

        assert_eq!(*revisions.lock().unwrap(), vec!["241", "15"]);
        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics["fetch_attempts"], 3);
        assert_eq!(metrics["updates"], 2);
    }

    #[test]
    fn failures_keep_published_config() {
        let center = Arc::new(NotificationCenter::new());
        let shared = Shared::new(center);
        shared.handle_response(modified("decide.json"));

        assert_eq!(shared.handle_response(Ok(DatafileResponse::NotModified)), None);
        assert_eq!(
            shared.handle_response(Ok(DatafileResponse::Modified {
                body: b"not json".to_vec(),
                last_modified: None,
            })),
            None
        );
        assert_eq!(
            shared.handle_response(Err(Error::HttpStatus {
                status: 500,
                url: "https://cdn.example.com".to_owned(),
            })),
            None
        );

        assert_eq!(shared.store.get().unwrap().revision(), "241");
        let metrics = shared.metrics.snapshot();
        assert_eq!(metrics["fetch_attempts"], 4);
        assert_eq!(metrics["not_modified"], 1);
        assert_eq!(metrics["decode_failures"], 1);
        assert_eq!(metrics["fetch_failures"], 1);
        assert_eq!(metrics["updates"], 1);
    }

    #[test]
    fn unauthorized_before_first_config_is_reported() {
        let shared = Shared::new(Arc::new(NotificationCenter::new()));
        shared.handle_response(Err(Error::HttpStatus {
            status: 403,
            url: "https://cdn.example.com".to_owned(),
        }));
        let result = shared.result.0.lock().unwrap().clone();
        assert!(matches!(result, Some(Err(Error::HttpStatus { status: 403, .. }))));
    }

    #[test]
    fn initial_datafile_is_available_immediately() {
        let _ = env_logger::builder().is_test(true).try_init();
        let execution = ExecutionContext::new();
        let manager = PollingProjectConfigManager::start(
            PollingConfig::new("sdk-key")
                // Nothing listens on port 9, so polls fail fast.
                .with_datafile_url_template("http://127.0.0.1:9/%s.json")
                .with_initial_datafile(read_datafile_json("decide.json"))
                .with_polling_interval(Duration::from_secs(3600)),
            Arc::new(NotificationCenter::new()),
            &execution,
        )
        .unwrap();

        manager.wait_for_configuration().unwrap();
        assert_eq!(manager.get_config().unwrap().revision(), "241");

        execution.cancel();
        execution.wait().unwrap();
        assert_eq!(manager.get_config().unwrap().revision(), "241");
    }

    #[test]
    fn wait_returns_after_shutdown_without_config() {
        let execution = ExecutionContext::new();
        let manager = PollingProjectConfigManager::start(
            PollingConfig::new("sdk-key")
                .with_datafile_url_template("http://127.0.0.1:9/%s.json")
                .with_polling_interval(Duration::from_secs(3600)),
            Arc::new(NotificationCenter::new()),
            &execution,
        )
        .unwrap();

        assert!(matches!(manager.get_config(), Err(Error::ConfigurationMissing)));
        execution.cancel();
        execution.wait().unwrap();
        assert!(matches!(
            manager.wait_for_configuration(),
            Err(Error::ClientClosed)
        ));
    }

    #[test]
    fn invalid_url_template() {
        let execution = ExecutionContext::new();
        let result = PollingProjectConfigManager::start(
            PollingConfig::new("sdk-key").with_datafile_url_template("not a url"),
            Arc::new(NotificationCenter::new()),
            &execution,
        );
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn jitter_is_subtractive() {
        let interval = Duration::from_secs(30);
        let jitter_max = Duration::from_secs(30);

        let result = jitter(interval, jitter_max);

        assert!(result <= interval, "{result:?} must be <= {interval:?}");
    }

    #[test]
    fn jitter_truncates_to_zero() {
        let result = jitter(Duration::ZERO, Duration::from_secs(30));
        assert_eq!(result, Duration::ZERO);
    }

    #[test]
    fn jitter_works_with_zero_jitter() {
        let result = jitter(Duration::from_secs(30), Duration::ZERO);
        assert_eq!(result, Duration::from_secs(30));
    }
}
