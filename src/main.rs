//! SPV wallet notification service.
//!
//! Main entry point. Loads configuration, connects to PostgreSQL, starts the
//! event bus and webhook manager when notifications are enabled, and serves
//! the admin API until a shutdown signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use spvwallet_api::{AppState, Config};
use spvwallet_core::{
    storage::{migrate, Storage},
    RealClock,
};
use spvwallet_notify::{EventBus, PostgresWebhookRepository, WebhookManager};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config.rust_log)?;

    info!("Starting SPV wallet notification service");
    info!(
        database_url = %config.database_url_masked(),
        host = %config.host,
        port = config.port,
        max_connections = config.database_max_connections,
        notifications_enabled = config.notifications_enabled,
        "Configuration loaded"
    );

    let db_pool = create_database_pool(&config).await?;
    info!("Database connection pool established");

    migrate(&db_pool).await.context("Failed to create webhooks table")?;
    info!("Database migrations completed");

    let clock = RealClock::shared();
    let storage = Arc::new(Storage::new(db_pool.clone()));
    let root = CancellationToken::new();

    let mut state = AppState::new(clock.clone()).with_storage(storage.clone());
    if let Some(admin_key) = config.admin_key.as_deref() {
        state = state.with_admin_key(admin_key);
    } else {
        warn!("ADMIN_KEY not set, admin endpoints are unauthenticated");
    }

    let notifications = if config.notifications_enabled {
        let notifications_config = config.to_notifications_config();
        let bus = EventBus::with_cancellation(notifications_config.ingress_capacity, &root);
        let repository = Arc::new(PostgresWebhookRepository::new(storage.clone(), clock.clone()));
        let manager = WebhookManager::start(
            repository,
            bus.clone(),
            &notifications_config,
            clock.clone(),
            &root,
        )
        .context("Failed to start webhook manager")?;

        let manager = Arc::new(manager);
        state = state.with_notifications(manager.clone());
        info!("Notification engine started");
        Some((bus, manager))
    } else {
        info!("Notifications disabled");
        None
    };

    let addr = config.parse_server_addr()?;
    let server_shutdown = root.child_token();
    let server_handle = tokio::spawn({
        let request_timeout = config.request_timeout();
        async move {
            let shutdown = async move { server_shutdown.cancelled().await };
            if let Err(e) = spvwallet_api::start_server(state, addr, request_timeout, shutdown).await
            {
                error!(error = %e, "Server failed");
            }
        }
    });

    info!(addr = %addr, "SPV wallet is ready");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");

    if let Some((bus, manager)) = notifications {
        if let Err(e) = manager.stop().await {
            error!(error = %e, "Webhook manager did not stop cleanly");
        }
        bus.shutdown().await;
        info!("Notification engine stopped");
    }

    root.cancel();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(30)) => {
            info!("Shutdown grace period expired");
        }
        _ = server_handle => {
            info!("Server stopped");
        }
    }

    db_pool.close().await;
    info!("Database connections closed");

    info!("SPV wallet shutdown complete");
    Ok(())
}

/// Initializes tracing, preferring `RUST_LOG` from the process environment.
fn init_tracing(default_filter: &str) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .context("Invalid RUST_LOG filter")?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
    Ok(())
}

/// Creates the database connection pool with retry logic.
async fn create_database_pool(config: &Config) -> Result<sqlx::PgPool> {
    const MAX_RETRIES: u32 = 5;
    const RETRY_DELAY: Duration = Duration::from_secs(2);
    let mut retries = 0;

    loop {
        match PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connection_timeout))
            .idle_timeout(Duration::from_secs(config.database_idle_timeout))
            .max_lifetime(Duration::from_secs(config.database_max_lifetime))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => {
                sqlx::query("SELECT 1")
                    .fetch_one(&pool)
                    .await
                    .context("Failed to verify database connection")?;

                return Ok(pool);
            },
            Err(e) if retries < MAX_RETRIES => {
                retries += 1;
                warn!(
                    attempt = retries,
                    max_retries = MAX_RETRIES,
                    error = %e,
                    "Database connection failed, retrying..."
                );
                tokio::time::sleep(RETRY_DELAY).await;
            },
            Err(e) => {
                return Err(e).context("Failed to create database connection pool after retries");
            },
        }
    }
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
