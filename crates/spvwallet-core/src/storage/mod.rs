//! Database access layer for webhook subscriptions.
//!
//! Repositories translate between domain models and the PostgreSQL schema;
//! [`migrate`] creates that schema.
//! The notification engine only sees the registry through its own adapter
//! trait, which the PostgreSQL repository here backs in production.

use std::sync::Arc;

use sqlx::PgPool;

pub mod webhooks;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Repository for webhook subscriptions.
    pub webhooks: Arc<webhooks::Repository>,
}

impl Storage {
    /// Creates a new storage instance with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self { webhooks: Arc::new(webhooks::Repository::new(pool)) }
    }

    /// Performs a health check on the database connection.
    ///
    /// Used by the readiness probe.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.webhooks.pool()).await?;

        Ok(())
    }
}

/// Creates the `webhooks` table and its ban index if missing.
///
/// # Errors
///
/// Returns `CoreError::Database` if a statement fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS webhooks (
            url TEXT PRIMARY KEY,
            token_header TEXT,
            token_value TEXT,
            banned_until TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_webhooks_banned_until
        ON webhooks(banned_until)
        WHERE banned_until IS NOT NULL
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}
