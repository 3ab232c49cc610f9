//! Datafile decoding and compilation into [`ProjectConfig`].
mod models;
mod project_config;

pub use models::*;
pub use project_config::{ProjectConfig, SUPPORTED_VERSIONS};
