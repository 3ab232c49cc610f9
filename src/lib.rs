//! The Rust SDK for Optimizely Feature Experimentation.
//!
//! # Overview
//!
//! The SDK revolves around a [`Client`] that decides feature flags and experiments for users.
//! Each user has an id and key-value [`Attributes`]. Decisions are deterministic: the same user
//! gets the same variation from the same datafile, on every host and in every SDK.
//!
//! The SDK is organized as a set of building blocks, all of which are public so they can be
//! replaced or reused:
//!
//! - [`datafile`] decodes the project datafile and compiles it into an immutable
//!   [`ProjectConfig`]. A config is replaced completely whenever a new revision arrives. Readers
//!   receive a *snapshot* that is not affected by further writes.
//! - [`config`] contains managers that own the current `ProjectConfig`: a static one and one
//!   polling the CDN on a background thread.
//! - [`audience`] evaluates audience conditions with three-valued logic and [`bucketer`] maps
//!   users to traffic ranges with MurmurHash3.
//! - [`decision`] runs the decision pipeline: forced variations, whitelists, user profiles,
//!   audiences, mutually exclusive groups, bucketing, and rollouts.
//! - [`cmab`] asks a remote predictor for variations of contextual multi-armed bandit
//!   experiments and caches its answers.
//! - [`events`] creates impressions and conversions, batches them on a background thread, and
//!   dispatches them to the ingest endpoint.
//! - [`notification`] lets applications subscribe to decisions, conversions, config updates, and
//!   dispatched batches.
//! - [`execution`] runs background workers and stops them on [`Client::close`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! In production, it is recommended to ignore all errors and use a safe default instead, as
//! feature flag evaluation should not be critical enough to cause system crashes. However, the
//! returned errors are valuable for debugging and usually indicate that developer's attention is
//! needed. The decide API never fails: problems are reported in [`Decision::reasons`].
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages,
//! under the `optimizely` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into SDK operations.
//!
//! # Examples
//!
//! ```no_run
//! # use optimizely::{Attributes, ClientConfig};
//! # fn main() -> optimizely::Result<()> {
//! let client = ClientConfig::from_sdk_key("sdk-key").to_client()?;
//! client.wait_for_configuration()?;
//!
//! let user = client.create_user_context("user-1", Attributes::new());
//! let decision = user.decide("checkout_flow", &[]);
//! println!("{}: {:?}", decision.flag_key, decision.variation_key);
//!
//! client.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod audience;
pub mod bucketer;
pub mod cmab;
pub mod config;
pub mod datafile;
pub mod decision;
pub mod entities;
pub mod events;
pub mod execution;
pub mod notification;

mod attributes;
mod client;
mod error;
mod str;
mod user_context;

#[cfg(test)]
mod test_utils;

pub use crate::str::Str;
pub use attributes::{AttributeValue, Attributes};
pub use client::{Client, ClientConfig, Decision, OptimizelyUserContext, VariableValue};
pub use datafile::ProjectConfig;
pub use decision::{
    DecideOption, DecideOptions, OptimizelyDecisionContext, OptimizelyForcedDecision,
};
pub use entities::{Audience, Experiment, Feature, Variable, VariableType, Variation};
pub use error::{Error, Result};
pub use events::EventTags;
pub use notification::{Notification, NotificationCenter, NotificationType};
pub use user_context::{UserContext, BUCKETING_ID_ATTRIBUTE, USER_AGENT_ATTRIBUTE};
