//! Bounded retry policy for batch delivery.
//!
//! A notifier makes at most `max_attempts` POSTs per batch and waits
//! `retry_delay` between them. Exhausting the attempts bans the subscriber.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Retry policy applied to every batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts, including the first one.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay: Duration::from_secs(1) }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again.
    Retry {
        /// Time to wait before the next attempt
        delay: Duration,
    },
    /// Stop retrying this batch.
    GiveUp {
        /// Why the batch is abandoned
        reason: String,
    },
}

impl RetryPolicy {
    /// Fixed-delay policy with the given bounds.
    pub fn fixed(max_attempts: u32, retry_delay: Duration) -> Self {
        Self { max_attempts, retry_delay }
    }

    /// Decides whether attempt `attempt_number` (1-based) that failed with
    /// `error` is followed by another one.
    pub fn decide(&self, attempt_number: u32, error: &NotifyError) -> RetryDecision {
        if attempt_number >= self.max_attempts {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.max_attempts),
            };
        }

        if !error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {error}") };
        }

        RetryDecision::Retry { delay: self.retry_delay }
    }
}
