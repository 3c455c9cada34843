//! Core domain types for the wallet notification engine.
//!
//! Provides the event envelope and domain event variants, the webhook
//! subscription model, a clock abstraction, and PostgreSQL storage for the
//! webhook registry. The notification and API crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use events::{
    name_of, DomainEvent, EnvelopeError, Event, RawEvent, StringEvent, TransactionEvent,
};
pub use models::{NewWebhook, Webhook};
pub use time::{Clock, RealClock, SharedClock, TestClock};
