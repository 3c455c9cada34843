//! Wallet server HTTP API: admin webhook management and health probes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use spvwallet_core::{storage::Storage, SharedClock};
use spvwallet_notify::WebhookManager;

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use config::Config;
pub use error::{ApiError, ErrorResponse};
pub use server::{create_router, create_router_with_timeout, start_server};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Database access, absent when running without PostgreSQL.
    pub storage: Option<Arc<Storage>>,
    /// Time source for probes and ban projection.
    pub clock: SharedClock,
    /// Notification engine, absent when notifications are disabled.
    pub notifications: Option<Arc<WebhookManager>>,
    /// Hex SHA-256 of the admin key; `None` leaves the admin group open.
    pub admin_key_hash: Option<String>,
}

impl AppState {
    /// State with no database, no notifications and an open admin group.
    pub fn new(clock: SharedClock) -> Self {
        Self { storage: None, clock, notifications: None, admin_key_hash: None }
    }

    /// Sets the database handle.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the notification engine.
    #[must_use]
    pub fn with_notifications(mut self, manager: Arc<WebhookManager>) -> Self {
        self.notifications = Some(manager);
        self
    }

    /// Protects the admin group with `admin_key`.
    #[must_use]
    pub fn with_admin_key(mut self, admin_key: &str) -> Self {
        self.admin_key_hash = Some(middleware::auth::hash_admin_key(admin_key));
        self
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("storage", &self.storage.is_some())
            .field("notifications", &self.notifications.is_some())
            .field("admin_auth", &self.admin_key_hash.is_some())
            .finish()
    }
}
