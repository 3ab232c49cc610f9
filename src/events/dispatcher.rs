use std::time::Duration;

use async_trait::async_trait;

use crate::{Error, Result};

use super::LogEvent;

/// Delivers batches to the ingest endpoint.
///
/// Dispatchers are invoked from the event processor worker. A failed dispatch drops the batch, so
/// implementations are responsible for their own retries.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Deliver one batch.
    async fn dispatch_event(&self, event: &LogEvent) -> Result<()>;
}

/// [`EventDispatcher`] posting batches over HTTP.
pub struct HttpEventDispatcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl HttpEventDispatcher {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    #[allow(missing_docs)]
    pub fn new(timeout: Duration) -> Result<HttpEventDispatcher> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpEventDispatcher { client })
    }
}

#[async_trait]
impl EventDispatcher for HttpEventDispatcher {
    async fn dispatch_event(&self, event: &LogEvent) -> Result<()> {
        let visitors = event.event.visitors.len();
        log::debug!(target: "optimizely", endpoint = event.endpoint.as_str(), visitors;
                    "dispatching event batch");

        let response = self
            .client
            .post(&event.endpoint)
            .json(&event.event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            log::warn!(target: "optimizely",
                       endpoint = event.endpoint.as_str(), status = status.as_u16();
                       "ingest endpoint rejected event batch");
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: event.endpoint.clone(),
            });
        }

        Ok(())
    }
}
