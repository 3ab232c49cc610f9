//! Batching of user events.
use std::{sync::Arc, time::Duration};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    execution::{Cancellation, ExecutionContext},
    notification::{Notification, NotificationCenter},
};

use super::{create_log_event, EventDispatcher, UserEvent, DEFAULT_EVENT_ENDPOINT};

/// Consumer of user events produced by the client.
pub trait EventProcessor: Send + Sync {
    /// Accept `event` for delivery. Returns `false` if the event was dropped.
    fn process(&self, event: UserEvent) -> bool;
}

/// Configuration for [`BatchEventProcessor`].
#[derive(Debug, Clone)]
pub struct BatchEventProcessorConfig {
    /// Maximum number of events per batch.
    ///
    /// Defaults to [`BatchEventProcessorConfig::DEFAULT_BATCH_SIZE`].
    pub batch_size: usize,
    /// Capacity of the queue between producers and the worker. Events are dropped while the queue
    /// is full.
    ///
    /// Defaults to [`BatchEventProcessorConfig::DEFAULT_QUEUE_SIZE`].
    pub queue_size: usize,
    /// Interval after which a non-empty batch is dispatched regardless of its size.
    ///
    /// Defaults to [`BatchEventProcessorConfig::DEFAULT_FLUSH_INTERVAL`].
    pub flush_interval: Duration,
    /// Ingest endpoint.
    pub endpoint: String,
}

impl BatchEventProcessorConfig {
    /// Default value for [`BatchEventProcessorConfig::batch_size`].
    pub const DEFAULT_BATCH_SIZE: usize = 10;
    /// Default value for [`BatchEventProcessorConfig::queue_size`].
    pub const DEFAULT_QUEUE_SIZE: usize = 2000;
    /// Default value for [`BatchEventProcessorConfig::flush_interval`].
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

    #[allow(missing_docs)]
    pub fn new() -> BatchEventProcessorConfig {
        BatchEventProcessorConfig::default()
    }

    #[allow(missing_docs)]
    pub fn with_batch_size(mut self, batch_size: usize) -> BatchEventProcessorConfig {
        self.batch_size = batch_size;
        self
    }

    #[allow(missing_docs)]
    pub fn with_queue_size(mut self, queue_size: usize) -> BatchEventProcessorConfig {
        self.queue_size = queue_size;
        self
    }

    #[allow(missing_docs)]
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> BatchEventProcessorConfig {
        self.flush_interval = flush_interval;
        self
    }

    #[allow(missing_docs)]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> BatchEventProcessorConfig {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for BatchEventProcessorConfig {
    fn default() -> Self {
        BatchEventProcessorConfig {
            batch_size: Self::DEFAULT_BATCH_SIZE,
            queue_size: Self::DEFAULT_QUEUE_SIZE,
            flush_interval: Self::DEFAULT_FLUSH_INTERVAL,
            endpoint: DEFAULT_EVENT_ENDPOINT.to_owned(),
        }
    }
}

/// [`EventProcessor`] accumulating events into batches on a background worker.
///
/// A batch is dispatched when it reaches `batch_size`, when the flush interval elapses, when an
/// event from another project or revision arrives, and when the execution context is cancelled.
#[derive(Debug, Clone)]
pub struct BatchEventProcessor {
    sender: mpsc::Sender<UserEvent>,
}

impl BatchEventProcessor {
    /// Start the worker within `execution`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread could not be spawned.
    pub fn start(
        config: BatchEventProcessorConfig,
        dispatcher: Arc<dyn EventDispatcher>,
        notification_center: Arc<NotificationCenter>,
        execution: &ExecutionContext,
    ) -> std::io::Result<BatchEventProcessor> {
        let batch_size = config.batch_size.max(1);
        let queue_size = config.queue_size.max(batch_size);
        let (sender, receiver) = mpsc::channel(queue_size);

        let worker = BatchWorker {
            batch: Vec::with_capacity(batch_size),
            batch_size,
            endpoint: config.endpoint,
            dispatcher,
            notification_center,
        };
        let flush_interval = config.flush_interval;
        execution.go("optimizely-events", move |cancellation| {
            worker.run(receiver, flush_interval, cancellation)
        })?;

        Ok(BatchEventProcessor { sender })
    }
}

impl EventProcessor for BatchEventProcessor {
    fn process(&self, event: UserEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                log::warn!(target: "optimizely", visitor_id = event.visitor_id.as_str();
                           "event queue is full, dropping event");
                false
            }
            Err(TrySendError::Closed(event)) => {
                log::warn!(target: "optimizely", visitor_id = event.visitor_id.as_str();
                           "event processor is stopped, dropping event");
                false
            }
        }
    }
}

struct BatchWorker {
    batch: Vec<UserEvent>,
    batch_size: usize,
    endpoint: String,
    dispatcher: Arc<dyn EventDispatcher>,
    notification_center: Arc<NotificationCenter>,
}

impl BatchWorker {
    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<UserEvent>,
        flush_interval: Duration,
        mut cancellation: Cancellation,
    ) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + flush_interval, flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = receiver.recv() => match event {
                    Some(event) => self.add(event).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush().await,
                _ = cancellation.cancelled() => {
                    // Drain whatever producers managed to enqueue before shutdown.
                    receiver.close();
                    while let Some(event) = receiver.recv().await {
                        self.add(event).await;
                    }
                    break;
                }
            }
        }

        self.flush().await;
        log::debug!(target: "optimizely", "event processor stopped");
    }

    async fn add(&mut self, event: UserEvent) {
        if let Some(first) = self.batch.first() {
            if !first.context.is_batchable_with(&event.context) {
                self.flush().await;
            }
        }

        self.batch.push(event);
        if self.batch.len() >= self.batch_size {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        let Some(log_event) = create_log_event(&batch, &self.endpoint) else {
            return;
        };

        log::debug!(target: "optimizely", events = batch.len(); "flushing event batch");
        match self.dispatcher.dispatch_event(&log_event).await {
            Ok(()) => {
                self.notification_center
                    .send(&Notification::LogEvent(log_event));
            }
            Err(err) => {
                log::warn!(target: "optimizely", events = batch.len();
                           "failed to dispatch event batch: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::{BatchEventProcessor, BatchEventProcessorConfig, EventProcessor};
    use crate::{
        datafile::ProjectConfig,
        decision::{DecisionReason, DecisionSource, FeatureDecision},
        events::{
            create_conversion_event, create_impression_event, EventDispatcher, LogEvent, UserEvent,
        },
        execution::ExecutionContext,
        notification::{NotificationCenter, NotificationType},
        test_utils::read_datafile,
        user_context::UserContext,
        Attributes, Error, Result,
    };

    #[derive(Default)]
    struct RecordingDispatcher {
        batches: Mutex<Vec<LogEvent>>,
        fail: bool,
    }

    #[async_trait]
    impl EventDispatcher for RecordingDispatcher {
        async fn dispatch_event(&self, event: &LogEvent) -> Result<()> {
            if self.fail {
                return Err(Error::HttpStatus {
                    status: 500,
                    url: event.endpoint.clone(),
                });
            }
            self.batches.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    impl RecordingDispatcher {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches
                .lock()
                .unwrap()
                .iter()
                .map(|batch| batch.event.visitors.len())
                .collect()
        }
    }

    fn impression(config: &ProjectConfig, user_id: &str) -> UserEvent {
        let experiment = config.experiment_by_key("checkout_test").unwrap();
        let decision = FeatureDecision {
            experiment: Some(experiment),
            variation: experiment.variation_by_key("control"),
            source: DecisionSource::FeatureTest,
            reason: DecisionReason::BucketedIntoVariation,
            cmab_uuid: None,
        };
        let user = UserContext::new(user_id, Attributes::new());
        create_impression_event(config, &decision, "checkout_flow", &user)
    }

    fn conversion(config: &ProjectConfig, user_id: &str) -> UserEvent {
        let user = UserContext::new(user_id, Attributes::new());
        create_conversion_event(config, "purchase", &user, Default::default()).unwrap()
    }

    fn events(config: &ProjectConfig) -> Vec<UserEvent> {
        let mut events: Vec<UserEvent> =
            (0..4).map(|i| impression(config, &format!("user_{i}"))).collect();
        events.extend((0..4).map(|i| conversion(config, &format!("user_{i}"))));
        events
    }

    fn start(
        config: BatchEventProcessorConfig,
        dispatcher: Arc<RecordingDispatcher>,
        notification_center: Arc<NotificationCenter>,
    ) -> (BatchEventProcessor, ExecutionContext) {
        let execution = ExecutionContext::new();
        let processor =
            BatchEventProcessor::start(config, dispatcher, notification_center, &execution)
                .unwrap();
        (processor, execution)
    }

    fn fast_flush() -> BatchEventProcessorConfig {
        BatchEventProcessorConfig::new()
            .with_batch_size(10)
            .with_flush_interval(Duration::from_millis(100))
    }

    #[test]
    fn flushes_on_interval() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = read_datafile("decide.json");
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (processor, execution) =
            start(fast_flush(), dispatcher.clone(), Arc::new(NotificationCenter::new()));

        for event in events(&config) {
            assert!(processor.process(event));
        }
        std::thread::sleep(Duration::from_millis(500));

        assert_eq!(dispatcher.batch_sizes(), vec![8]);

        execution.cancel();
        execution.wait().unwrap();
        assert_eq!(dispatcher.batch_sizes(), vec![8]);
    }

    #[test]
    fn revision_change_splits_batch() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = read_datafile("decide.json");
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (processor, execution) =
            start(fast_flush(), dispatcher.clone(), Arc::new(NotificationCenter::new()));

        for (i, mut event) in events(&config).into_iter().enumerate() {
            if i >= 2 {
                event.context.revision = "242".into();
            }
            assert!(processor.process(event));
        }
        std::thread::sleep(Duration::from_millis(500));

        assert_eq!(dispatcher.batch_sizes(), vec![2, 6]);
        let batches = dispatcher.batches.lock().unwrap();
        assert_eq!(batches[0].event.revision, "241");
        assert_eq!(batches[1].event.revision, "242");
        drop(batches);

        execution.cancel();
        execution.wait().unwrap();
    }

    #[test]
    fn flushes_full_batches_immediately() {
        let config = read_datafile("decide.json");
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (processor, execution) = start(
            BatchEventProcessorConfig::new()
                .with_batch_size(3)
                .with_flush_interval(Duration::from_secs(3600)),
            dispatcher.clone(),
            Arc::new(NotificationCenter::new()),
        );

        for event in events(&config) {
            assert!(processor.process(event));
        }
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(dispatcher.batch_sizes(), vec![3, 3]);

        // The remainder is flushed on shutdown.
        execution.cancel();
        execution.wait().unwrap();
        assert_eq!(dispatcher.batch_sizes(), vec![3, 3, 2]);
    }

    #[test]
    fn shutdown_flushes_pending_events() {
        let config = read_datafile("decide.json");
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (processor, execution) = start(
            BatchEventProcessorConfig::new().with_flush_interval(Duration::from_secs(3600)),
            dispatcher.clone(),
            Arc::new(NotificationCenter::new()),
        );

        assert!(processor.process(impression(&config, "user_1")));
        execution.cancel();
        execution.wait().unwrap();

        assert_eq!(dispatcher.batch_sizes(), vec![1]);
        assert!(!processor.process(impression(&config, "user_2")));
    }

    #[test]
    fn sends_log_event_notification_on_success() {
        let config = read_datafile("decide.json");
        let notification_center = Arc::new(NotificationCenter::new());
        let notified = Arc::new(Mutex::new(0));
        let notified_clone = notified.clone();
        notification_center.add(NotificationType::LogEvent, move |_| {
            *notified_clone.lock().unwrap() += 1;
        });

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let (processor, execution) = start(fast_flush(), dispatcher, notification_center.clone());
        assert!(processor.process(impression(&config, "user_1")));
        execution.cancel();
        execution.wait().unwrap();
        assert_eq!(*notified.lock().unwrap(), 1);

        let failing = Arc::new(RecordingDispatcher {
            fail: true,
            ..Default::default()
        });
        let (processor, execution) = start(fast_flush(), failing, notification_center);
        assert!(processor.process(impression(&config, "user_1")));
        execution.cancel();
        execution.wait().unwrap();
        assert_eq!(*notified.lock().unwrap(), 1);
    }

    #[test]
    fn drops_events_when_queue_is_full() {
        let config = read_datafile("decide.json");
        // The worker is never started, so the queue is never drained.
        let (sender, _receiver) = tokio::sync::mpsc::channel(1);
        let processor = BatchEventProcessor { sender };

        assert!(processor.process(impression(&config, "user_1")));
        assert!(!processor.process(impression(&config, "user_2")));
    }
}
