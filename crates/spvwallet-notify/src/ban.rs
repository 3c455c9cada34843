//! Temporary ban for subscribers whose endpoint keeps failing.
//!
//! A notifier that exhausts its retries on a batch bans itself for
//! `ban_duration`. While banned it drains its channel and discards events, so
//! a dead subscriber costs nothing but a channel receive per event.
//!
//! # Ban State Machine
//!
//! ```text
//!     ┌──────────────────┐   retries exhausted   ┌──────────────────┐
//!     │      ACTIVE      │ ────────────────────▶ │      BANNED      │
//!     │ (deliver batches)│                       │ (discard events) │
//!     └──────────────────┘ ◀──────────────────── └──────────────────┘
//!               ▲             ban_duration elapsed         │
//!               │                                          │ re-subscribe
//!               └──────────────────────────────────────────┘
//! ```
//!
//! Expiry is observed lazily: the first check after `until` clears the ban
//! and reports it once as [`BanCheck::Expired`].

use std::time::{Duration, Instant};

/// Result of checking the ban before handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanCheck {
    /// No ban in place.
    Active,
    /// Ban in place; the event must be discarded.
    Banned {
        /// Time left until the ban expires
        remaining: Duration,
    },
    /// The ban just expired; delivery resumes with this event.
    Expired,
}

/// Ban bookkeeping owned by one notifier.
#[derive(Debug, Clone)]
pub struct BanState {
    ban_duration: Duration,
    until: Option<Instant>,
    recovering: bool,
}

impl BanState {
    /// Creates an unbanned state.
    pub fn new(ban_duration: Duration) -> Self {
        Self { ban_duration, until: None, recovering: false }
    }

    /// Bans for the configured duration starting at `now`.
    ///
    /// Returns the instant the ban ends.
    pub fn ban(&mut self, now: Instant) -> Instant {
        let until = now + self.ban_duration;
        self.until = Some(until);
        self.recovering = false;
        until
    }

    /// Bans until `until`, used to honour a ban persisted before a restart.
    pub fn ban_until(&mut self, until: Instant) {
        self.until = Some(until);
        self.recovering = false;
    }

    /// Lifts the ban immediately.
    ///
    /// Returns true if a ban was in place.
    pub fn lift(&mut self) -> bool {
        self.recovering = false;
        self.until.take().is_some()
    }

    /// Checks the ban at `now`, clearing it if it has expired.
    pub fn check(&mut self, now: Instant) -> BanCheck {
        match self.until {
            None => BanCheck::Active,
            Some(until) if now < until => BanCheck::Banned { remaining: until - now },
            Some(_) => {
                self.until = None;
                self.recovering = true;
                BanCheck::Expired
            },
        }
    }

    /// Returns true while a ban is in place at `now`.
    pub fn is_banned(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Records a successful delivery.
    ///
    /// Returns true if this is the first success after a ban expired, which
    /// is when the persisted ban should be cleared.
    pub fn record_success(&mut self) -> bool {
        std::mem::take(&mut self.recovering)
    }

    /// Configured ban length.
    pub fn ban_duration(&self) -> Duration {
        self.ban_duration
    }
}
