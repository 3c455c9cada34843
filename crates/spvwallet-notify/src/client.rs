//! HTTP client that POSTs event batches to webhook subscribers.
//!
//! One client is shared by every notifier so connections are pooled across
//! subscribers. The request timeout bounds each attempt; cancellation of a
//! notifier drops the in-flight future, which aborts the request.

use std::{sync::Arc, time::Duration};

use reqwest::Response;
use serde::{Deserialize, Serialize};
use spvwallet_core::{RawEvent, Webhook};
use tracing::{info_span, Instrument};

use crate::error::{NotifyError, Result};

/// Largest response body kept for logging.
const MAX_LOGGED_BODY: usize = 1024;

/// Configuration for the webhook client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for a single delivery attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: concat!("spv-wallet-notifications/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 3,
        }
    }
}

/// Outcome of one POST that reached the subscriber.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the status was 2xx.
    pub is_success: bool,
}

impl DeliveryResponse {
    /// Converts a non-2xx answer into the matching error.
    ///
    /// # Errors
    ///
    /// `ClientError` for 4xx, `ServerError` for everything else that is not
    /// 2xx.
    pub fn error_for_status(self) -> Result<Self> {
        match self.status_code {
            200..=299 => Ok(self),
            400..=499 => Err(NotifyError::client_error(self.status_code, self.body)),
            _ => Err(NotifyError::server_error(self.status_code, self.body)),
        }
    }
}

/// Pooled HTTP client for webhook delivery.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl WebhookClient {
    /// Creates a new client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .build()
            .map_err(|e| NotifyError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration.
    ///
    /// # Errors
    ///
    /// See [`WebhookClient::new`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }

    /// POSTs `batch` to the subscriber as a JSON array of envelopes.
    ///
    /// Any HTTP answer is returned as `Ok`; use
    /// [`DeliveryResponse::error_for_status`] to treat non-2xx as failure.
    ///
    /// # Errors
    ///
    /// - `NetworkError` for connection and request-building failures
    /// - `Timeout` when no answer arrives in time
    /// - `Envelope` if the batch cannot be serialized
    pub async fn deliver(
        &self,
        webhook: &Webhook,
        batch: &[Arc<RawEvent>],
    ) -> Result<DeliveryResponse> {
        let span = info_span!("webhook_delivery", url = %webhook.url, batch_size = batch.len());

        async move {
            let start_time = std::time::Instant::now();
            let events: Vec<&RawEvent> = batch.iter().map(AsRef::as_ref).collect();
            let body = serde_json::to_vec(&events)
                .map_err(|e| NotifyError::Envelope { message: e.to_string() })?;

            let mut request = self
                .client
                .post(&webhook.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body);

            if let Some((header, value)) = webhook.token() {
                request = request.header(header, value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(
                        duration_ms = start_time.elapsed().as_millis(),
                        error = %e,
                        "webhook request failed"
                    );

                    if e.is_timeout() {
                        return Err(NotifyError::timeout(self.config.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(NotifyError::network(format!("connection failed: {e}")));
                    }
                    return Err(NotifyError::network(e.to_string()));
                },
            };

            let delivery = read_response(response, start_time.elapsed()).await;

            if delivery.is_success {
                tracing::debug!(
                    status = delivery.status_code,
                    duration_ms = delivery.duration.as_millis(),
                    "webhook accepted batch"
                );
            } else {
                tracing::warn!(
                    status = delivery.status_code,
                    duration_ms = delivery.duration.as_millis(),
                    "webhook rejected batch"
                );
            }

            Ok(delivery)
        }
        .instrument(span)
        .await
    }
}

async fn read_response(response: Response, duration: Duration) -> DeliveryResponse {
    let status_code = response.status().as_u16();
    let is_success = response.status().is_success();

    let body = match response.bytes().await {
        Ok(bytes) if bytes.len() > MAX_LOGGED_BODY => {
            format!("{}... (truncated)", String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]))
        },
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => format!("[failed to read response body: {e}]"),
    };

    DeliveryResponse { status_code, body, duration, is_success }
}
