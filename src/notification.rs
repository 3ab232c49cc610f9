//! In-process publish/subscribe of SDK notifications.
use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use serde::Serialize;

use crate::{
    events::{EventTags, LogEvent, UserEvent},
    Attributes, Error, Result, Str,
};

/// Kind of notification. Handlers subscribe to one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A decision was made.
    Decision,
    /// A conversion was tracked.
    Track,
    /// A new project config was published.
    ProjectConfigUpdate,
    /// An event batch was dispatched.
    LogEvent,
}

/// Kind of API call that produced a [`DecisionNotification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionNotificationType {
    /// `activate` or `get_variation`.
    AbTest,
    /// `is_feature_enabled`.
    Feature,
    /// A single variable getter.
    FeatureVariable,
    /// `get_all_feature_variables`.
    AllFeatureVariables,
    /// `decide` and friends.
    Flag,
}

/// Payload of [`Notification::Decision`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionNotification {
    #[serde(rename = "type")]
    #[allow(missing_docs)]
    pub decision_type: DecisionNotificationType,
    #[allow(missing_docs)]
    pub user_id: String,
    #[allow(missing_docs)]
    pub attributes: Attributes,
    /// Details of the decision. Shape depends on `decision_type`.
    pub decision_info: serde_json::Value,
}

/// Payload of [`Notification::Track`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackNotification {
    #[allow(missing_docs)]
    pub event_key: String,
    #[allow(missing_docs)]
    pub user_id: String,
    #[allow(missing_docs)]
    pub attributes: Attributes,
    #[allow(missing_docs)]
    pub event_tags: EventTags,
    /// The conversion handed to the event processor.
    pub conversion_event: UserEvent,
}

/// Payload of [`Notification::ProjectConfigUpdate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectConfigUpdateNotification {
    /// Revision of the newly published datafile.
    pub revision: Str,
}

/// A notification sent to subscribed handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[allow(missing_docs)]
pub enum Notification {
    Decision(DecisionNotification),
    Track(TrackNotification),
    ProjectConfigUpdate(ProjectConfigUpdateNotification),
    LogEvent(LogEvent),
}

impl Notification {
    /// Return the kind of this notification.
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Notification::Decision(_) => NotificationType::Decision,
            Notification::Track(_) => NotificationType::Track,
            Notification::ProjectConfigUpdate(_) => NotificationType::ProjectConfigUpdate,
            Notification::LogEvent(_) => NotificationType::LogEvent,
        }
    }
}

/// Notification handler.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Registry of notification handlers, scoped to one client.
#[derive(Default)]
pub struct NotificationCenter {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<NotificationType, Vec<(u64, NotificationHandler)>>>,
}

impl NotificationCenter {
    #[allow(missing_docs)]
    pub fn new() -> NotificationCenter {
        NotificationCenter::default()
    }

    /// Subscribe `handler` to notifications of `notification_type`. Returns an id to be passed to
    /// [`NotificationCenter::remove`].
    pub fn add(
        &self,
        notification_type: NotificationType,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.lock()
            .entry(notification_type)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Unsubscribe handler `id` from `notification_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotificationHandlerNotFound`] if no such handler is registered.
    pub fn remove(&self, id: u64, notification_type: NotificationType) -> Result<()> {
        let mut handlers = self.lock();
        let list = handlers
            .get_mut(&notification_type)
            .ok_or(Error::NotificationHandlerNotFound(id))?;
        let index = list
            .iter()
            .position(|(handler_id, _)| *handler_id == id)
            .ok_or(Error::NotificationHandlerNotFound(id))?;
        list.remove(index);
        Ok(())
    }

    /// Remove all handlers of `notification_type`.
    pub fn clear(&self, notification_type: NotificationType) {
        self.lock().remove(&notification_type);
    }

    /// Invoke handlers subscribed to the kind of `notification`, in registration order.
    ///
    /// Handlers run on the calling thread, outside of the registry lock. A panicking handler is
    /// logged and does not prevent the remaining handlers from running.
    pub fn send(&self, notification: &Notification) {
        let notification_type = notification.notification_type();
        let handlers = match self.lock().get(&notification_type) {
            Some(handlers) if !handlers.is_empty() => handlers.clone(),
            _ => return,
        };

        for (id, handler) in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(notification)));
            if result.is_err() {
                log::error!(target: "optimizely", handler_id = id;
                            "notification handler panicked while handling {notification_type:?}");
            }
        }
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<NotificationType, Vec<(u64, NotificationHandler)>>> {
        self.handlers
            .lock()
            .expect("thread holding notification handlers lock should not panic")
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers: HashMap<NotificationType, usize> = self
            .lock()
            .iter()
            .map(|(notification_type, list)| (*notification_type, list.len()))
            .collect();
        f.debug_struct("NotificationCenter")
            .field("handlers", &handlers)
            .finish()
    }
}
