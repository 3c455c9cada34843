//! Fixture builders for events and webhook rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use spvwallet_core::{RawEvent, StringEvent, TransactionEvent, Webhook};

/// `StringEvent` carrying `value`.
pub fn string_event(value: impl Into<String>) -> StringEvent {
    StringEvent { value: value.into() }
}

/// `count` string events valued `event-0`, `event-1`, ...
pub fn string_events(count: usize) -> Vec<StringEvent> {
    (0..count).map(|i| string_event(format!("event-{i}"))).collect()
}

/// Transaction event without a status.
pub fn transaction_event(user_id: &str, transaction_id: &str) -> TransactionEvent {
    TransactionEvent {
        user_id: user_id.to_string(),
        transaction_id: transaction_id.to_string(),
        status: None,
    }
}

/// Unwraps every envelope as a `StringEvent` and returns the values.
///
/// # Errors
///
/// Fails on the first envelope of another type.
pub fn string_values(events: &[RawEvent]) -> Result<Vec<String>> {
    events
        .iter()
        .map(|event| {
            event
                .unwrap::<StringEvent>()
                .map(|e| e.value)
                .with_context(|| format!("unexpected envelope {}", event.event_type))
        })
        .collect()
}

/// Builder for webhook registry rows.
#[derive(Debug, Clone)]
pub struct WebhookBuilder {
    url: String,
    token: Option<(String, String)>,
    banned_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl WebhookBuilder {
    /// Row for `url` without token or ban.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), token: None, banned_until: None, created_at: Utc::now() }
    }

    /// Sets the token header and value.
    #[must_use]
    pub fn token(mut self, header: impl Into<String>, value: impl Into<String>) -> Self {
        self.token = Some((header.into(), value.into()));
        self
    }

    /// Bans the row until `until`.
    #[must_use]
    pub fn banned_until(mut self, until: DateTime<Utc>) -> Self {
        self.banned_until = Some(until);
        self
    }

    /// Bans the row for `minutes` from its creation time.
    #[must_use]
    pub fn banned_for_minutes(self, minutes: i64) -> Self {
        let until = self.created_at + ChronoDuration::minutes(minutes);
        self.banned_until(until)
    }

    /// Sets the creation time.
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Builds the row.
    pub fn build(self) -> Webhook {
        let (token_header, token_value) = self.token.unzip();
        let mut webhook = Webhook::new(self.url, token_header, token_value, self.created_at);
        webhook.banned_until = self.banned_until;
        webhook
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_token_and_ban() {
        let now = Utc::now();
        let webhook = WebhookBuilder::new("http://a.com")
            .token("X-Auth", "secret")
            .created_at(now)
            .banned_for_minutes(5)
            .build();

        assert_eq!(webhook.token(), Some(("X-Auth", "secret")));
        assert!(webhook.is_banned(now));
        assert!(!webhook.is_banned(now + ChronoDuration::minutes(6)));
    }

    #[test]
    fn string_values_rejects_other_variants() {
        let events = vec![
            RawEvent::wrap(&string_event("a")).unwrap(),
            RawEvent::wrap(&transaction_event("u", "t")).unwrap(),
        ];

        assert!(string_values(&events).is_err());
        assert_eq!(string_values(&events[..1]).unwrap(), vec!["a"]);
    }
}
