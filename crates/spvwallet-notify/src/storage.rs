//! Registry adapter between the webhook manager and persistent storage.
//!
//! The manager depends only on [`WebhookRepository`]. Production wires in
//! [`PostgresWebhookRepository`] over `spvwallet_core::storage::Storage`;
//! tests and database-less deployments use
//! [`memory::InMemoryWebhookRepository`].
//!
//! Contract shared by all implementations:
//! - `create` is idempotent on URL and refreshes the token fields and ban
//! - `remove` reports whether a row existed; a missing row is not an error
//! - `get` returns a consistent snapshot

use std::{future::Future, pin::Pin, sync::Arc};

use chrono::{DateTime, Utc};
use spvwallet_core::{
    error::Result,
    models::{NewWebhook, Webhook},
    storage::Storage,
    SharedClock,
};

/// Registry operations required by the webhook manager.
pub trait WebhookRepository: Send + Sync + 'static {
    /// Inserts a subscription, or refreshes the row for an existing URL.
    fn create(
        &self,
        webhook: NewWebhook,
    ) -> Pin<Box<dyn Future<Output = Result<Webhook>> + Send + '_>>;

    /// Deletes the subscription for `url`, returning whether it existed.
    fn remove(&self, url: String) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;

    /// Persists a ban on `url` lasting until `until`.
    fn ban(
        &self,
        url: String,
        until: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Clears a persisted ban on `url`.
    fn clear_ban(&self, url: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Returns every subscription.
    fn get(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>>;
}

/// Registry backed by the PostgreSQL `webhooks` table.
pub struct PostgresWebhookRepository {
    storage: Arc<Storage>,
    clock: SharedClock,
}

impl PostgresWebhookRepository {
    /// Creates a new PostgreSQL registry adapter.
    pub fn new(storage: Arc<Storage>, clock: SharedClock) -> Self {
        Self { storage, clock }
    }
}

impl WebhookRepository for PostgresWebhookRepository {
    fn create(
        &self,
        webhook: NewWebhook,
    ) -> Pin<Box<dyn Future<Output = Result<Webhook>> + Send + '_>> {
        let storage = self.storage.clone();
        let now = self.clock.now_utc();
        Box::pin(async move { storage.webhooks.upsert(&webhook, now).await })
    }

    fn remove(&self, url: String) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhooks.remove(&url).await })
    }

    fn ban(
        &self,
        url: String,
        until: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.webhooks.ban(&url, until).await?;
            Ok(())
        })
    }

    fn clear_ban(&self, url: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move {
            storage.webhooks.clear_ban(&url).await?;
            Ok(())
        })
    }

    fn get(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>> {
        let storage = self.storage.clone();
        Box::pin(async move { storage.webhooks.find_all().await })
    }
}

/// In-memory registry for tests and database-less deployments.
pub mod memory {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use spvwallet_core::CoreError;
    use tokio::sync::RwLock;

    use super::*;

    /// Registry stored in process memory, in insertion order.
    ///
    /// Supports injecting storage failures and counting snapshot reads.
    #[derive(Default)]
    pub struct InMemoryWebhookRepository {
        rows: Arc<RwLock<Vec<Webhook>>>,
        injected_error: Arc<RwLock<Option<String>>>,
        unavailable: Arc<RwLock<bool>>,
        snapshot_reads: Arc<AtomicUsize>,
    }

    impl InMemoryWebhookRepository {
        /// Creates an empty registry.
        pub fn new() -> Self {
            Self::default()
        }

        /// Inserts a row as-is, bypassing `create`.
        pub async fn insert(&self, webhook: Webhook) {
            let mut rows = self.rows.write().await;
            rows.retain(|row| row.url != webhook.url);
            rows.push(webhook);
        }

        /// Returns the row for `url`.
        pub async fn find(&self, url: &str) -> Option<Webhook> {
            self.rows.read().await.iter().find(|row| row.url == url).cloned()
        }

        /// Fails the next operation with a database error.
        pub async fn inject_error(&self, message: impl Into<String>) {
            *self.injected_error.write().await = Some(message.into());
        }

        /// Fails every operation while set.
        pub async fn set_unavailable(&self, unavailable: bool) {
            *self.unavailable.write().await = unavailable;
        }

        /// Number of `get` calls served so far.
        pub fn snapshot_reads(&self) -> usize {
            self.snapshot_reads.load(Ordering::Relaxed)
        }

        async fn check_failure(
            injected_error: &RwLock<Option<String>>,
            unavailable: &RwLock<bool>,
        ) -> Result<()> {
            if let Some(message) = injected_error.write().await.take() {
                return Err(CoreError::Database(message));
            }
            if *unavailable.read().await {
                return Err(CoreError::Database("registry unavailable".to_string()));
            }
            Ok(())
        }
    }

    impl WebhookRepository for InMemoryWebhookRepository {
        fn create(
            &self,
            webhook: NewWebhook,
        ) -> Pin<Box<dyn Future<Output = Result<Webhook>> + Send + '_>> {
            Box::pin(async move {
                Self::check_failure(&self.injected_error, &self.unavailable).await?;

                let now = Utc::now();
                let mut rows = self.rows.write().await;
                if let Some(row) = rows.iter_mut().find(|row| row.url == webhook.url) {
                    row.token_header = webhook.token_header;
                    row.token_value = webhook.token_value;
                    row.banned_until = None;
                    row.updated_at = now;
                    return Ok(row.clone());
                }

                let row = webhook.into_webhook(now);
                rows.push(row.clone());
                Ok(row)
            })
        }

        fn remove(&self, url: String) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
            Box::pin(async move {
                Self::check_failure(&self.injected_error, &self.unavailable).await?;

                let mut rows = self.rows.write().await;
                let before = rows.len();
                rows.retain(|row| row.url != url);
                Ok(rows.len() < before)
            })
        }

        fn ban(
            &self,
            url: String,
            until: DateTime<Utc>,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                Self::check_failure(&self.injected_error, &self.unavailable).await?;

                if let Some(row) = self.rows.write().await.iter_mut().find(|row| row.url == url) {
                    row.banned_until = Some(until);
                    row.updated_at = Utc::now();
                }
                Ok(())
            })
        }

        fn clear_ban(
            &self,
            url: String,
        ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move {
                Self::check_failure(&self.injected_error, &self.unavailable).await?;

                if let Some(row) = self.rows.write().await.iter_mut().find(|row| row.url == url) {
                    row.banned_until = None;
                    row.updated_at = Utc::now();
                }
                Ok(())
            })
        }

        fn get(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Webhook>>> + Send + '_>> {
            Box::pin(async move {
                Self::check_failure(&self.injected_error, &self.unavailable).await?;

                self.snapshot_reads.fetch_add(1, Ordering::Relaxed);
                Ok(self.rows.read().await.clone())
            })
        }
    }

}
