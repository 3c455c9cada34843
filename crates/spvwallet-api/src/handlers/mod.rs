//! HTTP request handlers.
//!
//! - `webhooks` - admin subscription management under `/admin/webhooks`
//! - `health` - health, readiness and liveness probes
//!
//! Handlers log with structured fields and return [`crate::ApiError`] for
//! every failure, so clients always receive a `{code, message}` payload.

pub mod health;
pub mod webhooks;

pub use health::{health_check, liveness_check, readiness_check};
pub use webhooks::{list_webhooks, subscribe_webhook, unsubscribe_webhook};
