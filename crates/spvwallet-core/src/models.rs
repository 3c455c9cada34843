//! Webhook subscription model.
//!
//! A subscription is identified by its URL. Token fields are optional and
//! travel together: a subscriber either receives a single static header on
//! every POST or none at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent webhook subscription as stored in the `webhooks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Webhook {
    /// Absolute http(s) URL events are POSTed to. Unique.
    pub url: String,

    /// Name of the header carrying the subscriber token.
    pub token_header: Option<String>,

    /// Value sent in `token_header`.
    pub token_value: Option<String>,

    /// Delivery is suppressed until this instant.
    pub banned_until: Option<DateTime<Utc>>,

    /// When the subscription was first created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last written.
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    /// Creates an unbanned subscription stamped at `now`.
    pub fn new(
        url: impl Into<String>,
        token_header: Option<String>,
        token_value: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            token_header,
            token_value,
            banned_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true while `banned_until` lies in the future.
    pub fn is_banned(&self, now: DateTime<Utc>) -> bool {
        self.banned_until.is_some_and(|until| until > now)
    }

    /// Returns the `(header, value)` pair to attach to deliveries.
    ///
    /// An empty header name means no token.
    pub fn token(&self) -> Option<(&str, &str)> {
        match (self.token_header.as_deref(), self.token_value.as_deref()) {
            (Some(header), value) if !header.is_empty() => Some((header, value.unwrap_or(""))),
            _ => None,
        }
    }

    /// True when both records describe the same delivery target.
    ///
    /// Timestamps are ignored so that a reconcile pass only pushes a new
    /// definition to a running notifier when something it uses changed.
    pub fn same_definition(&self, other: &Self) -> bool {
        self.url == other.url
            && self.token_header == other.token_header
            && self.token_value == other.token_value
    }
}

/// Input for creating or refreshing a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWebhook {
    /// Subscription URL.
    pub url: String,
    /// Token header name.
    pub token_header: Option<String>,
    /// Token header value.
    pub token_value: Option<String>,
}

impl NewWebhook {
    /// Subscription with a token header.
    pub fn with_token(
        url: impl Into<String>,
        token_header: impl Into<String>,
        token_value: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            token_header: Some(token_header.into()),
            token_value: Some(token_value.into()),
        }
    }

    /// Materializes the row stored for this input.
    pub fn into_webhook(self, now: DateTime<Utc>) -> Webhook {
        Webhook::new(self.url, self.token_header, self.token_value, now)
    }
}
