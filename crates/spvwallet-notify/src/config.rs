//! Runtime options for the notification engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    client::ClientConfig,
    error::{NotifyError, Result},
    retry::RetryPolicy,
};

/// Flat option set recognized by the bus, notifiers and manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Master switch. When false the manager does not run and the admin
    /// surface answers 404.
    pub enabled: bool,

    /// Period of the registry reconcile tick.
    pub reconcile_interval: Duration,

    /// Capacity of the bus ingress queue.
    pub ingress_capacity: usize,

    /// Capacity of each subscriber's egress channel.
    pub egress_capacity: usize,

    /// Largest number of events in one POST.
    pub max_batch_size: usize,

    /// Delivery attempts per batch before the subscriber is banned.
    pub max_retries: u32,

    /// Pause between delivery attempts.
    pub retry_delay: Duration,

    /// How long a banned subscriber receives nothing.
    pub ban_duration: Duration,

    /// Timeout for one delivery attempt.
    pub http_timeout: Duration,

    /// How long `stop` waits for notifier tasks to finish.
    pub shutdown_timeout: Duration,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reconcile_interval: Duration::from_secs(5),
            ingress_capacity: crate::DEFAULT_INGRESS_CAPACITY,
            egress_capacity: crate::DEFAULT_EGRESS_CAPACITY,
            max_batch_size: crate::DEFAULT_MAX_BATCH_SIZE,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            ban_duration: Duration::from_secs(60 * 60),
            http_timeout: Duration::from_secs(20),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl NotificationsConfig {
    /// Rejects values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Configuration` naming the first bad option.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.reconcile_interval.is_zero(), "reconcile interval must be positive"),
            (self.ingress_capacity == 0, "ingress capacity must be positive"),
            (self.egress_capacity == 0, "egress capacity must be positive"),
            (self.max_batch_size == 0, "max batch size must be positive"),
            (self.max_retries == 0, "max retries must be positive"),
            (self.http_timeout.is_zero(), "http timeout must be positive"),
            (self.ban_duration > crate::MAX_BAN_DURATION, "ban duration must not exceed one year"),
        ];

        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(NotifyError::configuration(message)),
            None => Ok(()),
        }
    }

    /// Retry policy derived from `max_retries` and `retry_delay`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, self.retry_delay)
    }

    /// HTTP client settings derived from `http_timeout`.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig { timeout: self.http_timeout, ..ClientConfig::default() }
    }
}
