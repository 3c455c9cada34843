//! Domain events and the self-describing envelope that carries them.
//!
//! Producers inside the wallet emit strongly-typed events. Before an event
//! crosses the notification system it is wrapped into a [`RawEvent`], a
//! `{type, content}` record whose `type` is a stable discriminator chosen at
//! compile time for each event variant.
//!
//! # Envelope Flow
//!
//! ```text
//! ┌──────────────────┐   wrap    ┌──────────────────────┐   JSON array   ┌────────────┐
//! │ TransactionEvent │ ────────▶ │ RawEvent             │ ─────────────▶ │ Subscriber │
//! │ StringEvent      │           │ {type, content}      │                │ (webhook)  │
//! └──────────────────┘           └──────────────────────┘                └────────────┘
//!          ▲                                │
//!          │            unwrap::<E>()       │
//!          └────────────────────────────────┘
//! ```
//!
//! The variant set is closed at build time. Adding a variant means adding a
//! type that implements [`Event`] and extending [`DomainEvent`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// A domain event that can travel through the notification system.
///
/// `NAME` is the wire discriminator and must be unique across all variants.
pub trait Event: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable discriminator written to the envelope `type` field.
    const NAME: &'static str;
}

/// Returns the stable discriminator for event variant `E`.
pub fn name_of<E: Event>() -> &'static str {
    E::NAME
}

/// Errors raised while moving between typed events and envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The event could not be serialized.
    #[error("failed to encode {event_type}: {source}")]
    Encode {
        /// Discriminator of the event being encoded
        event_type: &'static str,
        /// Underlying serializer error
        #[source]
        source: serde_json::Error,
    },

    /// The envelope carries a different variant than the one requested.
    #[error("event type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Discriminator of the requested variant
        expected: &'static str,
        /// Discriminator found in the envelope
        actual: String,
    },

    /// The envelope content does not decode into the requested variant.
    #[error("failed to decode {event_type} content: {source}")]
    Decode {
        /// Discriminator of the requested variant
        event_type: &'static str,
        /// Underlying deserializer error
        #[source]
        source: serde_json::Error,
    },

    /// The envelope names a variant this build does not know.
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

/// Self-describing event record: `{"type": "...", "content": {...}}`.
///
/// Immutable once created. Shared between subscribers behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Variant discriminator.
    #[serde(rename = "type")]
    pub event_type: String,

    /// Variant payload in its JSON form.
    pub content: serde_json::Value,
}

impl RawEvent {
    /// Wraps a typed event into an envelope.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::Encode` if the event cannot be serialized,
    /// which only happens for programming errors such as non-string map keys.
    pub fn wrap<E: Event>(event: &E) -> Result<Self, EnvelopeError> {
        let content = serde_json::to_value(event)
            .map_err(|source| EnvelopeError::Encode { event_type: E::NAME, source })?;

        Ok(Self { event_type: E::NAME.to_string(), content })
    }

    /// Recovers the typed event carried by this envelope.
    ///
    /// # Errors
    ///
    /// Returns `EnvelopeError::TypeMismatch` when the discriminator does not
    /// match `E::NAME`, and `EnvelopeError::Decode` when the content is
    /// malformed for `E`.
    pub fn unwrap<E: Event>(&self) -> Result<E, EnvelopeError> {
        if !self.is::<E>() {
            return Err(EnvelopeError::TypeMismatch {
                expected: E::NAME,
                actual: self.event_type.clone(),
            });
        }

        E::deserialize(&self.content)
            .map_err(|source| EnvelopeError::Decode { event_type: E::NAME, source })
    }

    /// Returns true if this envelope carries variant `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.event_type == E::NAME
    }
}

/// Free-form text notification, mostly used for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEvent {
    /// Message text.
    pub value: String,
}

impl Event for StringEvent {
    const NAME: &'static str = "StringEvent";
}

/// Emitted when a transaction owned by a user is recorded or changes state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvent {
    /// Owner of the transaction.
    pub user_id: String,

    /// Transaction identifier (txid).
    pub transaction_id: String,

    /// Broadcast status, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Event for TransactionEvent {
    const NAME: &'static str = "TransactionEvent";
}

/// Closed set of every event variant this build understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// See [`StringEvent`].
    String(StringEvent),
    /// See [`TransactionEvent`].
    Transaction(TransactionEvent),
}

impl DomainEvent {
    /// Discriminators of all variants, in declaration order.
    pub const NAMES: [&'static str; 2] = [StringEvent::NAME, TransactionEvent::NAME];

    /// Returns the discriminator of the carried variant.
    pub fn name(&self) -> &'static str {
        match self {
            Self::String(_) => StringEvent::NAME,
            Self::Transaction(_) => TransactionEvent::NAME,
        }
    }

    /// Wraps the carried variant into an envelope.
    ///
    /// # Errors
    ///
    /// See [`RawEvent::wrap`].
    pub fn to_raw(&self) -> Result<RawEvent, EnvelopeError> {
        match self {
            Self::String(event) => RawEvent::wrap(event),
            Self::Transaction(event) => RawEvent::wrap(event),
        }
    }
}

impl TryFrom<&RawEvent> for DomainEvent {
    type Error = EnvelopeError;

    fn try_from(raw: &RawEvent) -> Result<Self, Self::Error> {
        match raw.event_type.as_str() {
            StringEvent::NAME => raw.unwrap::<StringEvent>().map(Self::String),
            TransactionEvent::NAME => raw.unwrap::<TransactionEvent>().map(Self::Transaction),
            other => Err(EnvelopeError::UnknownType(other.to_string())),
        }
    }
}

impl From<StringEvent> for DomainEvent {
    fn from(event: StringEvent) -> Self {
        Self::String(event)
    }
}

impl From<TransactionEvent> for DomainEvent {
    fn from(event: TransactionEvent) -> Self {
        Self::Transaction(event)
    }
}
