//! Test infrastructure for the notification engine.
//!
//! Provides wiremock-backed subscribers, fixture builders, a running bus
//! plus manager over an in-memory registry with a virtual clock, and
//! schema-isolated PostgreSQL databases for registry tests.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod database;
pub mod env;
pub mod fixtures;
pub mod http;

pub use database::TestDatabase;
pub use env::{NotificationEnv, NotificationEnvBuilder};
pub use fixtures::{string_event, string_events, string_values, transaction_event, WebhookBuilder};
pub use http::WebhookRecorder;
pub use spvwallet_core::TestClock;
