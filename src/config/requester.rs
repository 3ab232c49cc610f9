//! HTTP client fetching datafiles.
use std::time::Duration;

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, IF_MODIFIED_SINCE, LAST_MODIFIED},
    StatusCode, Url,
};

use crate::{Error, Result};

/// Configuration of datafile requests.
#[derive(Debug, Clone)]
pub struct RequesterConfig {
    /// Timeout of one request.
    ///
    /// Defaults to [`RequesterConfig::DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    /// Attempts after the first failed one.
    ///
    /// Defaults to [`RequesterConfig::DEFAULT_RETRIES`].
    pub retries: u32,
    /// Fixed delay between attempts.
    ///
    /// Defaults to [`RequesterConfig::DEFAULT_RETRY_DELAY`].
    pub retry_delay: Duration,
    /// Extra headers sent with every request (e.g., authorization of private datafiles).
    pub headers: Vec<(String, String)>,
}

impl RequesterConfig {
    /// Default value for [`RequesterConfig::timeout`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default value for [`RequesterConfig::retries`].
    pub const DEFAULT_RETRIES: u32 = 1;
    /// Default value for [`RequesterConfig::retry_delay`].
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

    #[allow(missing_docs)]
    pub fn new() -> RequesterConfig {
        RequesterConfig::default()
    }

    #[allow(missing_docs)]
    pub fn with_timeout(mut self, timeout: Duration) -> RequesterConfig {
        self.timeout = timeout;
        self
    }

    #[allow(missing_docs)]
    pub fn with_retries(mut self, retries: u32) -> RequesterConfig {
        self.retries = retries;
        self
    }

    #[allow(missing_docs)]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> RequesterConfig {
        self.retry_delay = retry_delay;
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> RequesterConfig {
        self.headers.push((name.into(), value.into()));
        self
    }

    fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|err| {
                Error::InvalidArgument(format!("invalid header name {name:?}: {err}"))
            })?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| Error::InvalidArgument(format!("invalid header value: {err}")))?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}

impl Default for RequesterConfig {
    fn default() -> Self {
        RequesterConfig {
            timeout: Self::DEFAULT_TIMEOUT,
            retries: Self::DEFAULT_RETRIES,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            headers: Vec::new(),
        }
    }
}

/// Outcome of a datafile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatafileResponse {
    /// Server responded with a datafile.
    Modified {
        #[allow(missing_docs)]
        body: Vec<u8>,
        /// Value of the `Last-Modified` header, to be sent back as `If-Modified-Since`.
        last_modified: Option<String>,
    },
    /// Datafile has not changed since the `If-Modified-Since` time.
    NotModified,
}

/// Build the datafile URL for `sdk_key` from `template`, where `%s` stands for the key.
pub fn datafile_url(template: &str, sdk_key: &str) -> Result<Url> {
    Ok(Url::parse(&template.replace("%s", sdk_key))?)
}

/// Asynchronous datafile requester, used by the polling worker.
#[derive(Debug, Clone)]
pub struct Requester {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    retries: u32,
    retry_delay: Duration,
}

impl Requester {
    #[allow(missing_docs)]
    pub fn new(config: &RequesterConfig) -> Result<Requester> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(config.header_map()?)
            .build()?;
        Ok(Requester {
            client,
            retries: config.retries,
            retry_delay: config.retry_delay,
        })
    }

    /// Fetch the datafile at `url`, retrying failed attempts.
    ///
    /// `401 Unauthorized` and `403 Forbidden` responses are returned without retrying.
    pub async fn fetch(&self, url: &Url, last_modified: Option<&str>) -> Result<DatafileResponse> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, last_modified).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    log::debug!(target: "optimizely", url = url.as_str(), attempt;
                                "datafile request failed, retrying: {err}");
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(
        &self,
        url: &Url,
        last_modified: Option<&str>,
    ) -> Result<DatafileResponse> {
        let mut request = self.client.get(url.clone());
        if let Some(last_modified) = last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(DatafileResponse::NotModified);
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let last_modified = last_modified_header(response.headers());
        let body = response.bytes().await?.to_vec();
        Ok(DatafileResponse::Modified {
            body,
            last_modified,
        })
    }
}

/// Fetch the datafile at `url`, blocking the calling thread. Retries like [`Requester::fetch`].
///
/// Must not be called from within an async runtime.
pub fn fetch_blocking(url: &Url, config: &RequesterConfig) -> Result<Vec<u8>> {
    let client = reqwest::blocking::Client::builder()
        .timeout(config.timeout)
        .default_headers(config.header_map()?)
        .build()?;

    let mut attempt = 0;
    loop {
        let result = client
            .get(url.clone())
            .send()
            .map_err(Error::from)
            .and_then(|response| {
                let status = response.status();
                if status.is_success() {
                    Ok(response.bytes()?.to_vec())
                } else {
                    Err(Error::HttpStatus {
                        status: status.as_u16(),
                        url: url.to_string(),
                    })
                }
            });

        match result {
            Ok(body) => return Ok(body),
            Err(err) if attempt < config.retries && is_retryable(&err) => {
                log::debug!(target: "optimizely", url = url.as_str(), attempt;
                            "datafile request failed, retrying: {err}");
                attempt += 1;
                std::thread::sleep(config.retry_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Authorization failures are terminal, anything else may be retried.
fn is_retryable(err: &Error) -> bool {
    !matches!(
        err,
        Error::HttpStatus {
            status: 401 | 403,
            ..
        }
    )
}

fn last_modified_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LAST_MODIFIED)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
