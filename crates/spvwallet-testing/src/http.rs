//! Mock webhook subscribers backed by wiremock.
//!
//! A [`WebhookRecorder`] answers POSTs according to one of a few canned
//! behaviours and decodes every received body back into envelopes.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use spvwallet_core::RawEvent;
use wiremock::{matchers, Mock, MockServer, Request, ResponseTemplate};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Subscriber endpoint that records every delivery.
pub struct WebhookRecorder {
    server: MockServer,
    failures: usize,
}

impl WebhookRecorder {
    /// Subscriber that accepts every batch.
    pub async fn start() -> Self {
        Self::responding(ResponseTemplate::new(200), 0).await
    }

    /// Subscriber that accepts every batch after `delay`.
    pub async fn with_delay(delay: Duration) -> Self {
        Self::responding(ResponseTemplate::new(200).set_delay(delay), 0).await
    }

    /// Subscriber that never answers within any sensible timeout.
    pub async fn hanging() -> Self {
        Self::with_delay(Duration::from_secs(3600)).await
    }

    /// Subscriber that answers every request with `status`.
    pub async fn always_failing(status: u16) -> Self {
        Self::responding(ResponseTemplate::new(status), usize::MAX).await
    }

    /// Subscriber that answers the first `times` requests with `status` and
    /// accepts afterwards.
    pub async fn failing_first(status: u16, times: u64) -> Self {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;

        Self { server, failures: usize::try_from(times).unwrap_or(usize::MAX) }
    }

    async fn responding(template: ResponseTemplate, failures: usize) -> Self {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST")).respond_with(template).mount(&server).await;
        Self { server, failures }
    }

    /// Base URL to subscribe.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Every request received so far, in arrival order.
    pub async fn requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of POSTs received.
    pub async fn request_count(&self) -> usize {
        self.requests().await.len()
    }

    /// Decoded body of every request, failed attempts included.
    pub async fn batches(&self) -> Result<Vec<Vec<RawEvent>>> {
        self.requests()
            .await
            .iter()
            .map(|request| {
                serde_json::from_slice(&request.body).context("request body is not an envelope array")
            })
            .collect()
    }

    /// Decoded bodies of the requests that were answered with 2xx.
    pub async fn accepted_batches(&self) -> Result<Vec<Vec<RawEvent>>> {
        Ok(self.batches().await?.into_iter().skip(self.failures).collect())
    }

    /// Events of all accepted batches, flattened in delivery order.
    pub async fn accepted_events(&self) -> Result<Vec<RawEvent>> {
        Ok(self.accepted_batches().await?.into_iter().flatten().collect())
    }

    /// Value of header `name` on every request.
    pub async fn header_values(&self, name: &str) -> Vec<Option<String>> {
        self.requests()
            .await
            .iter()
            .map(|request| {
                request.headers.get(name).and_then(|v| v.to_str().ok()).map(String::from)
            })
            .collect()
    }

    /// Waits until at least `count` requests arrived.
    ///
    /// # Errors
    ///
    /// Fails if `timeout` elapses first.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> Result<()> {
        let waited = tokio::time::timeout(timeout, async {
            while self.request_count().await < count {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        if waited.is_err() {
            bail!("expected {count} requests, got {} within {timeout:?}", self.request_count().await);
        }
        Ok(())
    }

    /// Waits until accepted batches carry at least `count` events and
    /// returns them.
    ///
    /// # Errors
    ///
    /// Fails if `timeout` elapses first or a body does not decode.
    pub async fn wait_for_events(&self, count: usize, timeout: Duration) -> Result<Vec<RawEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let events = self.accepted_events().await?;
            if events.len() >= count {
                return Ok(events);
            }
            if tokio::time::Instant::now() >= deadline {
                bail!("expected {count} events, got {} within {timeout:?}", events.len());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
