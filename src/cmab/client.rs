//! HTTP client of the remote CMAB predictor.
use std::{future::Future, time::Duration};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    execution::{Cancellation, ExecutionContext},
    AttributeValue, Error, Result, Str,
};

use super::CmabAttributes;

/// Default prediction endpoint. `%s` is replaced with the rule id.
pub const DEFAULT_PREDICTION_ENDPOINT: &str = "https://prediction.cmab.optimizely.com/predict/%s";

/// Backoff policy between prediction attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts after the first one.
    pub max_retries: u32,
    #[allow(missing_docs)]
    pub initial_backoff: Duration,
    #[allow(missing_docs)]
    pub max_backoff: Duration,
    #[allow(missing_docs)]
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Default number of retries.
    pub const DEFAULT_MAX_RETRIES: u32 = 1;
    /// Default delay before the first retry.
    pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
    /// Default upper bound of the delay.
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);
    /// Default growth factor of the delay.
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

    /// Delay after failed attempt number `attempt` (starting at 0).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(delay.max(0.0))
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: Self::DEFAULT_MAX_RETRIES,
            initial_backoff: Self::DEFAULT_INITIAL_BACKOFF,
            max_backoff: Self::DEFAULT_MAX_BACKOFF,
            backoff_multiplier: Self::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// Remote predictor assigning variations of CMAB experiments.
pub trait CmabClient: Send + Sync {
    /// Return the variation id the predictor picked for the user.
    fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &CmabAttributes,
        cmab_uuid: &str,
    ) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct PredictionRequest {
    instances: [PredictionInstance; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictionInstance {
    visitor_id: String,
    experiment_id: String,
    attributes: Vec<PredictionAttribute>,
    #[serde(rename = "cmabUUID")]
    cmab_uuid: String,
}

#[derive(Debug, Serialize)]
struct PredictionAttribute {
    id: Str,
    value: AttributeValue,
    #[serde(rename = "type")]
    attribute_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    variation_id: String,
}

fn prediction_request(
    rule_id: &str,
    user_id: &str,
    attributes: &CmabAttributes,
    cmab_uuid: &str,
) -> PredictionRequest {
    PredictionRequest {
        instances: [PredictionInstance {
            visitor_id: user_id.to_owned(),
            experiment_id: rule_id.to_owned(),
            attributes: attributes
                .iter()
                .map(|(id, value)| PredictionAttribute {
                    id: id.clone(),
                    value: value.clone(),
                    attribute_type: "custom_attribute",
                })
                .collect(),
            cmab_uuid: cmab_uuid.to_owned(),
        }],
    }
}

fn parse_prediction(body: &[u8]) -> Result<String> {
    let response: PredictionResponse = serde_json::from_slice(body)
        .map_err(|err| Error::InvalidCmabResponse(err.to_string()))?;
    match response.predictions.into_iter().next() {
        Some(prediction) if !prediction.variation_id.is_empty() => Ok(prediction.variation_id),
        _ => Err(Error::InvalidCmabResponse(
            "missing variation_id in predictions".to_owned(),
        )),
    }
}

/// Run `op` until it succeeds or `retry` is exhausted. Without a retry policy, `op` runs once.
pub(crate) async fn with_retries<T, F, Fut>(retry: Option<&RetryConfig>, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = retry.map_or(0, |retry| retry.max_retries);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_retries => {
                let delay = retry.map_or(Duration::ZERO, |retry| retry.backoff(attempt));
                log::debug!(target: "optimizely", attempt;
                            "CMAB prediction failed, retrying in {delay:?}: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

struct PredictionJob {
    url: Url,
    request: PredictionRequest,
    reply: std::sync::mpsc::Sender<Result<String>>,
}

/// [`CmabClient`] calling the prediction endpoint over HTTP.
///
/// Requests run on a worker thread owned by the [`ExecutionContext`] the client was started
/// with. Callers block until the prediction (including retries) completes.
pub struct DefaultCmabClient {
    endpoint: String,
    jobs: mpsc::UnboundedSender<PredictionJob>,
}

impl DefaultCmabClient {
    /// Start the prediction worker on `execution` and return a client posting to `endpoint`
    /// (with `%s` standing for the rule id).
    ///
    /// The worker stops when `execution` is cancelled. Later requests fail with
    /// [`Error::ClientClosed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the worker thread cannot be
    /// spawned.
    pub fn start(
        endpoint: impl Into<String>,
        timeout: Duration,
        retry: Option<RetryConfig>,
        execution: &ExecutionContext,
    ) -> Result<DefaultCmabClient> {
        // Client holds a connection pool internally, so we're reusing the client between requests.
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let (jobs, receiver) = mpsc::unbounded_channel();

        execution.go("optimizely-cmab", move |cancellation| {
            run_worker(client, retry, receiver, cancellation)
        })?;

        Ok(DefaultCmabClient {
            endpoint: endpoint.into(),
            jobs,
        })
    }

    fn url(&self, rule_id: &str) -> Result<Url> {
        Ok(Url::parse(&self.endpoint.replace("%s", rule_id))?)
    }
}

async fn run_worker(
    client: reqwest::Client,
    retry: Option<RetryConfig>,
    mut receiver: mpsc::UnboundedReceiver<PredictionJob>,
    mut cancellation: Cancellation,
) {
    loop {
        tokio::select! {
            job = receiver.recv() => match job {
                Some(job) => {
                    tokio::spawn(run_job(client.clone(), retry.clone(), job));
                }
                None => break,
            },
            _ = cancellation.cancelled() => break,
        }
    }
    log::debug!(target: "optimizely", "CMAB worker stopped");
}

async fn run_job(client: reqwest::Client, retry: Option<RetryConfig>, job: PredictionJob) {
    let result =
        with_retries(retry.as_ref(), || try_fetch(&client, &job.url, &job.request)).await;
    // Caller is gone if the send fails.
    let _ = job.reply.send(result);
}

async fn try_fetch(
    client: &reqwest::Client,
    url: &Url,
    request: &PredictionRequest,
) -> Result<String> {
    let response = client.post(url.clone()).json(request).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    parse_prediction(&response.bytes().await?)
}

impl CmabClient for DefaultCmabClient {
    fn fetch_decision(
        &self,
        rule_id: &str,
        user_id: &str,
        attributes: &CmabAttributes,
        cmab_uuid: &str,
    ) -> Result<String> {
        let url = self.url(rule_id)?;
        let request = prediction_request(rule_id, user_id, attributes, cmab_uuid);
        let (reply, response) = std::sync::mpsc::channel();

        log::debug!(target: "optimizely", rule_id, user_id; "fetching CMAB prediction");
        self.jobs
            .send(PredictionJob {
                url,
                request,
                reply,
            })
            .map_err(|_| Error::ClientClosed)?;

        response
            .recv()
            .map_err(|_| Error::ClientClosed)
            .and_then(|result| result)
            .inspect_err(|err| {
                log::warn!(target: "optimizely", rule_id, user_id;
                           "failed to fetch CMAB prediction: {err}");
            })
    }
}
