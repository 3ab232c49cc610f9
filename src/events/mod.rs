//! Impression and conversion events.
//!
//! Events are created per user call by the factory, handed to an [`EventProcessor`], coalesced into
//! batches and delivered by an [`EventDispatcher`].
mod dispatcher;
mod factory;
mod log_event;
mod processor;
mod user_event;

pub use dispatcher::{EventDispatcher, HttpEventDispatcher};
pub use factory::{
    create_conversion_event, create_impression_event, visitor_attributes, BOT_FILTERING_ATTRIBUTE,
};
pub use log_event::{
    create_log_event, Attribute, Decision, DecisionMetadata, EventBatch, LogEvent, Snapshot,
    SnapshotEvent, Visitor, DEFAULT_EVENT_ENDPOINT,
};
pub use processor::{BatchEventProcessor, BatchEventProcessorConfig, EventProcessor};
pub use user_event::{
    ConversionEvent, EventContext, EventTags, ImpressionEvent, UserEvent, UserEventPayload,
    VisitorAttribute, CLIENT_NAME, CLIENT_VERSION,
};
