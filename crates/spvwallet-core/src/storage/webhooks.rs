//! Repository for webhook subscription rows.
//!
//! The `webhooks` table is keyed by URL. Writing an existing URL refreshes
//! its token fields and lifts any ban, so re-subscribing is both idempotent
//! and the way to rotate a token.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{NewWebhook, Webhook},
};

/// Repository for webhook subscription operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a subscription or refreshes the existing row for its URL.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn upsert(&self, webhook: &NewWebhook, now: DateTime<Utc>) -> Result<Webhook> {
        let row = sqlx::query_as::<_, Webhook>(
            r"
            INSERT INTO webhooks (url, token_header, token_value, banned_until, created_at, updated_at)
            VALUES ($1, $2, $3, NULL, $4, $4)
            ON CONFLICT (url) DO UPDATE SET
                token_header = EXCLUDED.token_header,
                token_value = EXCLUDED.token_value,
                banned_until = NULL,
                updated_at = EXCLUDED.updated_at
            RETURNING url, token_header, token_value, banned_until, created_at, updated_at
            ",
        )
        .bind(&webhook.url)
        .bind(&webhook.token_header)
        .bind(&webhook.token_value)
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(row)
    }

    /// Deletes the subscription for `url`.
    ///
    /// Returns whether a row was removed. A missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn remove(&self, url: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM webhooks WHERE url = $1")
            .bind(url)
            .execute(&*self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stamps `banned_until` on the subscription for `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn ban(&self, url: &str, until: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE webhooks
            SET banned_until = $2, updated_at = NOW()
            WHERE url = $1
            ",
        )
        .bind(url)
        .bind(until)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Clears `banned_until` on the subscription for `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the statement fails.
    pub async fn clear_ban(&self, url: &str) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE webhooks
            SET banned_until = NULL, updated_at = NOW()
            WHERE url = $1 AND banned_until IS NOT NULL
            ",
        )
        .bind(url)
        .execute(&*self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Returns every subscription ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<Webhook>> {
        let rows = sqlx::query_as::<_, Webhook>(
            r"
            SELECT url, token_header, token_value, banned_until, created_at, updated_at
            FROM webhooks
            ORDER BY created_at, url
            ",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows)
    }
}
