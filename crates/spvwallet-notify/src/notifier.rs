//! Per-subscriber worker that batches events and POSTs them.
//!
//! # Worker Loop
//!
//! ```text
//!          ┌──────────────────────────────────────────────────────────┐
//!          ▼                                                          │
//!   ┌─────────────┐  event   ┌──────────┐  banned    discard ────────┤
//!   │ await event │ ───────▶ │ ban gate │ ─────────▶                  │
//!   └─────────────┘          └──────────┘                             │
//!                                 │ active                            │
//!                                 ▼                                   │
//!                        ┌──────────────────┐  try_recv until empty   │
//!                        │ accumulate batch │  or max_batch_size      │
//!                        └──────────────────┘                         │
//!                                 │                                   │
//!                                 ▼                                   │
//!                        ┌──────────────────┐  2xx                    │
//!                        │ POST with retries│ ────────────────────────┤
//!                        └──────────────────┘                         │
//!                                 │ exhausted                         │
//!                                 ▼                                   │
//!                          ban, report to manager ────────────────────┘
//! ```
//!
//! At most one request is in flight per subscriber. Cancellation drops the
//! in-flight request and any unsent batch.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use spvwallet_core::{RawEvent, SharedClock, Webhook};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    ban::{BanCheck, BanState},
    bus::EgressReceiver,
    client::{DeliveryResponse, WebhookClient},
    error::{ErrorCategory, NotifyError, Result},
    retry::{RetryDecision, RetryPolicy},
};

/// Ban transitions a notifier reports to its manager for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierReport {
    /// Retries were exhausted; delivery is suppressed until `until`.
    Banned {
        /// Subscription URL
        url: String,
        /// End of the ban
        until: DateTime<Utc>,
    },
    /// First successful delivery after a ban expired.
    Recovered {
        /// Subscription URL
        url: String,
    },
}

/// Delivery counters of one notifier.
#[derive(Debug, Default)]
pub struct NotifierCounters {
    batches_delivered: AtomicU64,
    events_delivered: AtomicU64,
    events_discarded: AtomicU64,
    failed_attempts: AtomicU64,
    bans: AtomicU64,
    banned: AtomicBool,
}

/// Snapshot of [`NotifierCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    /// Batches accepted by the subscriber.
    pub batches_delivered: u64,
    /// Events inside accepted batches.
    pub events_delivered: u64,
    /// Events dropped while banned or after exhausted retries.
    pub events_discarded: u64,
    /// Attempts that did not get a 2xx answer.
    pub failed_attempts: u64,
    /// Number of bans entered.
    pub bans: u64,
    /// Whether a ban is currently in place.
    pub banned: bool,
}

impl NotifierCounters {
    /// Reads all counters.
    pub fn snapshot(&self) -> NotifierStats {
        NotifierStats {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            bans: self.bans.load(Ordering::Relaxed),
            banned: self.banned.load(Ordering::Relaxed),
        }
    }

    fn discard(&self, count: usize) {
        self.events_discarded.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Tunables shared by all notifiers of a manager.
#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Largest number of events in one POST.
    pub max_batch_size: usize,
    /// Attempts per batch and delay between them.
    pub retry_policy: RetryPolicy,
    /// How long a ban lasts.
    pub ban_duration: Duration,
}

/// Worker delivering one subscriber's events.
pub struct WebhookNotifier {
    definition: watch::Receiver<Webhook>,
    receiver: EgressReceiver,
    client: Arc<WebhookClient>,
    settings: NotifierSettings,
    ban: BanState,
    counters: Arc<NotifierCounters>,
    clock: SharedClock,
    cancellation_token: CancellationToken,
    reports: mpsc::UnboundedSender<NotifierReport>,
}

impl WebhookNotifier {
    /// Creates a notifier for the subscription currently in `definition`.
    ///
    /// A `banned_until` in the future starts the notifier banned until that
    /// instant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        definition: watch::Receiver<Webhook>,
        receiver: EgressReceiver,
        client: Arc<WebhookClient>,
        settings: NotifierSettings,
        counters: Arc<NotifierCounters>,
        clock: SharedClock,
        cancellation_token: CancellationToken,
        reports: mpsc::UnboundedSender<NotifierReport>,
    ) -> Self {
        let mut ban = BanState::new(settings.ban_duration);

        let persisted_ban = definition.borrow().banned_until;
        if let Some(until) = persisted_ban {
            let remaining = (until - clock.now_utc()).to_std().unwrap_or_default();
            if !remaining.is_zero() {
                ban.ban_until(clock.now() + remaining);
                counters.banned.store(true, Ordering::Relaxed);
            }
        }

        Self {
            definition,
            receiver,
            client,
            settings,
            ban,
            counters,
            clock,
            cancellation_token,
            reports,
        }
    }

    fn url(&self) -> String {
        self.definition.borrow().url.clone()
    }

    /// Runs until cancelled or until the egress channel closes.
    pub async fn run(mut self) {
        let url = self.url();
        info!(url = %url, "webhook notifier started");

        loop {
            let first = tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => break,
                changed = self.definition.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.apply_definition();
                    continue;
                },
                event = self.receiver.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            match self.ban.check(self.clock.now()) {
                BanCheck::Banned { remaining } => {
                    self.counters.discard(1);
                    trace!(url = %url, remaining_secs = remaining.as_secs(), "subscriber banned, event discarded");
                    continue;
                },
                BanCheck::Expired => {
                    self.counters.banned.store(false, Ordering::Relaxed);
                    info!(url = %url, "ban expired, resuming delivery");
                },
                BanCheck::Active => {},
            }

            let Some(batch) = self.accumulate(first) else {
                break;
            };

            match self.deliver(&batch).await {
                Ok(()) | Err(NotifyError::RetriesExhausted { .. }) => {},
                Err(NotifyError::ShutdownRequested) => break,
                Err(error) => {
                    warn!(url = %url, error = %error, "unexpected notifier failure");
                },
            }
        }

        info!(url = %url, "webhook notifier stopped");
    }

    /// Collects `first` plus whatever is already queued, up to the batch cap.
    ///
    /// Returns `None` if cancellation interrupts accumulation.
    fn accumulate(&mut self, first: Arc<RawEvent>) -> Option<Vec<Arc<RawEvent>>> {
        let mut batch = vec![first];
        while batch.len() < self.settings.max_batch_size {
            if self.cancellation_token.is_cancelled() {
                return None;
            }
            match self.receiver.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }

        Some(batch)
    }

    /// POSTs `batch` until it is accepted or the retry policy gives up.
    async fn deliver(&mut self, batch: &[Arc<RawEvent>]) -> Result<()> {
        let mut attempt = 1;

        loop {
            let definition = self.definition.borrow().clone();

            let result = tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => return Err(NotifyError::ShutdownRequested),
                result = self.client.deliver(&definition, batch) => {
                    result.and_then(DeliveryResponse::error_for_status)
                },
            };

            let error = match result {
                Ok(_) => {
                    self.record_success(&definition.url, batch.len());
                    return Ok(());
                },
                Err(error) => error,
            };

            self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
            warn!(
                url = %definition.url,
                attempt,
                batch_size = batch.len(),
                category = %ErrorCategory::from(&error),
                error = %error,
                "webhook delivery attempt failed"
            );

            match self.settings.retry_policy.decide(attempt, &error) {
                RetryDecision::Retry { delay } => {
                    tokio::select! {
                        biased;
                        () = self.cancellation_token.cancelled() => return Err(NotifyError::ShutdownRequested),
                        () = self.clock.sleep(delay) => {},
                    }
                    attempt += 1;
                },
                RetryDecision::GiveUp { reason } => {
                    self.enter_ban(&definition.url, batch.len(), &reason);
                    return Err(NotifyError::retries_exhausted(attempt));
                },
            }
        }
    }

    fn record_success(&mut self, url: &str, batch_size: usize) {
        self.counters.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.counters.events_delivered.fetch_add(batch_size as u64, Ordering::Relaxed);
        debug!(url = %url, batch_size, "batch delivered");

        if self.ban.record_success() {
            let _ = self.reports.send(NotifierReport::Recovered { url: url.to_string() });
        }
    }

    fn enter_ban(&mut self, url: &str, batch_size: usize, reason: &str) {
        self.ban.ban(self.clock.now());
        let until = ban_deadline(self.clock.now_utc(), self.ban.ban_duration());

        self.counters.discard(batch_size);
        self.counters.bans.fetch_add(1, Ordering::Relaxed);
        self.counters.banned.store(true, Ordering::Relaxed);

        warn!(url = %url, until = %until, reason = %reason, "webhook banned after repeated failures");
        let _ = self.reports.send(NotifierReport::Banned { url: url.to_string(), until });
    }

    /// A pushed definition without `banned_until` lifts any ban in place.
    fn apply_definition(&mut self) {
        let definition = self.definition.borrow_and_update();
        if definition.banned_until.is_none() && self.ban.lift() {
            self.counters.banned.store(false, Ordering::Relaxed);
            info!(url = %definition.url, "ban lifted by subscription refresh");
        }
    }
}

fn ban_deadline(now: DateTime<Utc>, ban_duration: Duration) -> DateTime<Utc> {
    let capped = chrono::Duration::from_std(ban_duration.min(crate::MAX_BAN_DURATION))
        .unwrap_or_else(|_| chrono::Duration::days(365));
    now.checked_add_signed(capped).unwrap_or(now)
}
