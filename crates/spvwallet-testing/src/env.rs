//! Notification engine wired up for tests.
//!
//! Runs the real bus, manager and notifiers over an in-memory registry and a
//! [`TestClock`]. Retry pauses advance virtual time instead of sleeping, so
//! scenarios that exhaust retries finish immediately.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use spvwallet_core::{Event, TestClock};
use spvwallet_notify::{
    storage::memory::InMemoryWebhookRepository, EventBus, NotificationsConfig, WebhookManager,
};
use tokio_util::sync::CancellationToken;

use crate::fixtures;

/// Builder for [`NotificationEnv`].
#[derive(Debug, Clone)]
pub struct NotificationEnvBuilder {
    config: NotificationsConfig,
}

impl Default for NotificationEnvBuilder {
    fn default() -> Self {
        Self {
            config: NotificationsConfig {
                enabled: true,
                reconcile_interval: Duration::from_millis(100),
                retry_delay: Duration::from_millis(10),
                http_timeout: Duration::from_secs(5),
                shutdown_timeout: Duration::from_secs(5),
                ..NotificationsConfig::default()
            },
        }
    }
}

impl NotificationEnvBuilder {
    /// Creates a builder with fast test defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-subscriber egress capacity.
    #[must_use]
    pub fn egress_capacity(mut self, capacity: usize) -> Self {
        self.config.egress_capacity = capacity;
        self
    }

    /// Sets the maximum batch size.
    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Sets the number of delivery attempts per batch.
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the ban duration.
    #[must_use]
    pub fn ban_duration(mut self, duration: Duration) -> Self {
        self.config.ban_duration = duration;
        self
    }

    /// Sets the reconcile tick period.
    #[must_use]
    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.config.reconcile_interval = interval;
        self
    }

    /// Sets the HTTP timeout of one delivery attempt.
    #[must_use]
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    /// Starts the bus and manager.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid.
    pub fn build(self) -> Result<NotificationEnv> {
        let root = CancellationToken::new();
        let clock = TestClock::new();
        let repository = Arc::new(InMemoryWebhookRepository::new());
        let bus = EventBus::with_cancellation(self.config.ingress_capacity, &root);

        let manager = WebhookManager::start(
            repository.clone(),
            bus.clone(),
            &self.config,
            clock.shared(),
            &root,
        )
        .context("failed to start webhook manager")?;

        Ok(NotificationEnv {
            bus,
            manager: Arc::new(manager),
            repository,
            clock,
            config: self.config,
            root,
        })
    }
}

/// Running notification engine with handles for assertions.
pub struct NotificationEnv {
    /// Event bus producers publish to.
    pub bus: EventBus,
    /// Manager owning the notifiers.
    pub manager: Arc<WebhookManager>,
    /// Registry the manager reconciles against.
    pub repository: Arc<InMemoryWebhookRepository>,
    /// Virtual clock driving ban expiry and retry pauses.
    pub clock: TestClock,
    /// Effective configuration.
    pub config: NotificationsConfig,
    root: CancellationToken,
}

impl NotificationEnv {
    /// Starts an environment with default test settings.
    ///
    /// # Errors
    ///
    /// See [`NotificationEnvBuilder::build`].
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Returns a builder for custom settings.
    pub fn builder() -> NotificationEnvBuilder {
        NotificationEnvBuilder::new()
    }

    /// Subscribes `url` and waits until its notifier is registered.
    ///
    /// # Errors
    ///
    /// Fails if the subscription is rejected or the reconcile fails.
    pub async fn subscribe(&self, url: &str, token_header: &str, token_value: &str) -> Result<()> {
        self.manager.subscribe(url, token_header, token_value).await?;
        self.manager.reconcile().await?;
        Ok(())
    }

    /// Unsubscribes `url` and waits until its notifier is gone.
    ///
    /// # Errors
    ///
    /// Fails if the URL is unknown or the reconcile fails.
    pub async fn unsubscribe(&self, url: &str) -> Result<()> {
        self.manager.unsubscribe(url).await?;
        self.manager.reconcile().await?;
        Ok(())
    }

    /// Publishes `event` on the bus.
    ///
    /// # Errors
    ///
    /// Fails if the bus is closed.
    pub async fn notify<E: Event>(&self, event: &E) -> Result<()> {
        self.bus.notify_event(event).await?;
        Ok(())
    }

    /// Publishes `count` string events back to back and returns their values.
    ///
    /// # Errors
    ///
    /// Fails if the bus is closed.
    pub async fn notify_strings(&self, count: usize) -> Result<Vec<String>> {
        let events = fixtures::string_events(count);
        for event in &events {
            self.notify(event).await?;
        }
        Ok(events.into_iter().map(|e| e.value).collect())
    }

    /// Moves the virtual clock forward.
    pub fn advance_time(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    /// Stops the manager, then the bus.
    ///
    /// # Errors
    ///
    /// Fails if notifiers do not stop within the shutdown timeout.
    pub async fn shutdown(self) -> Result<()> {
        self.manager.stop().await?;
        self.bus.shutdown().await;
        self.root.cancel();
        Ok(())
    }
}
