//! PostgreSQL databases for registry tests.
//!
//! Every [`TestDatabase`] gets its own schema inside the database named by
//! `DATABASE_URL`, with the `webhooks` table already created. Tests that
//! need PostgreSQL call [`TestDatabase::from_env`] and return early when no
//! database is configured.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use spvwallet_core::storage::{migrate, Storage};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Schema-isolated handle on the test database.
#[derive(Debug)]
pub struct TestDatabase {
    pool: PgPool,
    schema: String,
}

impl TestDatabase {
    /// Creates a fresh schema in the database named by `DATABASE_URL`.
    ///
    /// Returns `None` when `DATABASE_URL` is not set.
    ///
    /// # Errors
    ///
    /// Fails if the URL does not parse, the server is unreachable, or the
    /// schema cannot be created.
    pub async fn from_env() -> Result<Option<Self>> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            warn!("DATABASE_URL not set, skipping PostgreSQL test");
            return Ok(None);
        };

        let options =
            database_url.parse::<PgConnectOptions>().context("failed to parse DATABASE_URL")?;
        let schema = format!("test_{}", Uuid::new_v4().simple());

        let admin = connect(options.clone()).await.context("failed to connect to test database")?;
        sqlx::query(&format!("CREATE SCHEMA \"{schema}\""))
            .execute(&admin)
            .await
            .with_context(|| format!("failed to create schema {schema}"))?;
        admin.close().await;

        let pool = connect(options.options([("search_path", schema.as_str())]))
            .await
            .with_context(|| format!("failed to connect to schema {schema}"))?;
        migrate(&pool).await.context("failed to create webhooks table")?;

        debug!(schema = %schema, "created test schema");
        Ok(Some(Self { pool, schema }))
    }

    /// Connection pool scoped to this database's schema.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Name of the schema backing this database.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Storage layer over this database.
    pub fn storage(&self) -> Arc<Storage> {
        Arc::new(Storage::new(self.pool.clone()))
    }

    /// Drops the schema and closes the pool.
    ///
    /// # Errors
    ///
    /// Fails if the schema cannot be dropped.
    pub async fn cleanup(self) -> Result<()> {
        sqlx::query(&format!("DROP SCHEMA IF EXISTS \"{}\" CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .with_context(|| format!("failed to drop schema {}", self.schema))?;
        self.pool.close().await;
        Ok(())
    }
}

async fn connect(options: PgConnectOptions) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .min_connections(0)
        .max_lifetime(Duration::from_secs(300))
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await?;
    Ok(pool)
}
