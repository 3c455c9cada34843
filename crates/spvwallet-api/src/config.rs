//! Configuration management for the wallet notification service.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use spvwallet_notify::NotificationsConfig;

const CONFIG_FILE: &str = "config.toml";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables (highest priority)
/// 2. Configuration file (`config.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// # Example
///
/// ```no_run
/// use spvwallet_api::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("Server will bind to {}:{}", config.host, config.port);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Database
    /// PostgreSQL connection URL.
    ///
    /// Environment variable: `DATABASE_URL`
    #[serde(default = "default_database_url", alias = "DATABASE_URL")]
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    ///
    /// Environment variable: `DATABASE_MAX_CONNECTIONS`
    #[serde(default = "default_max_connections", alias = "DATABASE_MAX_CONNECTIONS")]
    pub database_max_connections: u32,
    /// Minimum number of connections to maintain in the pool.
    ///
    /// Environment variable: `DATABASE_MIN_CONNECTIONS`
    #[serde(default = "default_min_connections", alias = "DATABASE_MIN_CONNECTIONS")]
    pub database_min_connections: u32,
    /// Database connection acquire timeout in seconds.
    ///
    /// Environment variable: `DATABASE_CONNECTION_TIMEOUT`
    #[serde(default = "default_acquire_timeout", alias = "DATABASE_CONNECTION_TIMEOUT")]
    pub database_connection_timeout: u64,
    /// Database connection idle timeout in seconds.
    ///
    /// Environment variable: `DATABASE_IDLE_TIMEOUT`
    #[serde(default = "default_idle_timeout", alias = "DATABASE_IDLE_TIMEOUT")]
    pub database_idle_timeout: u64,
    /// Maximum lifetime of database connections in seconds.
    ///
    /// Environment variable: `DATABASE_MAX_LIFETIME`
    #[serde(default = "default_max_lifetime", alias = "DATABASE_MAX_LIFETIME")]
    pub database_max_lifetime: u64,

    // Server
    /// Server bind address.
    ///
    /// Environment variable: `HOST`
    #[serde(default = "default_host", alias = "HOST")]
    pub host: String,
    /// Server bind port.
    ///
    /// Environment variable: `PORT`
    #[serde(default = "default_port", alias = "PORT")]
    pub port: u16,
    /// HTTP request timeout in seconds.
    ///
    /// Environment variable: `REQUEST_TIMEOUT`
    #[serde(default = "default_request_timeout", alias = "REQUEST_TIMEOUT")]
    pub request_timeout: u64,
    /// Admin key guarding `/admin`. Unset leaves the admin group open.
    ///
    /// Environment variable: `ADMIN_KEY`
    #[serde(default, alias = "ADMIN_KEY", skip_serializing)]
    pub admin_key: Option<String>,

    // Notifications
    /// Master switch for the notification engine.
    ///
    /// Environment variable: `NOTIFICATIONS_ENABLED`
    #[serde(default, alias = "NOTIFICATIONS_ENABLED")]
    pub notifications_enabled: bool,
    /// Registry reconcile period in milliseconds.
    ///
    /// Environment variable: `NOTIFICATIONS_RECONCILE_INTERVAL_MS`
    #[serde(default = "default_reconcile_interval_ms", alias = "NOTIFICATIONS_RECONCILE_INTERVAL_MS")]
    pub notifications_reconcile_interval_ms: u64,
    /// Capacity of the bus ingress queue.
    ///
    /// Environment variable: `NOTIFICATIONS_INGRESS_CAPACITY`
    #[serde(default = "default_ingress_capacity", alias = "NOTIFICATIONS_INGRESS_CAPACITY")]
    pub notifications_ingress_capacity: usize,
    /// Capacity of each subscriber's egress channel.
    ///
    /// Environment variable: `NOTIFICATIONS_EGRESS_CAPACITY`
    #[serde(default = "default_egress_capacity", alias = "NOTIFICATIONS_EGRESS_CAPACITY")]
    pub notifications_egress_capacity: usize,
    /// Largest number of events in one POST.
    ///
    /// Environment variable: `NOTIFICATIONS_MAX_BATCH_SIZE`
    #[serde(default = "default_max_batch_size", alias = "NOTIFICATIONS_MAX_BATCH_SIZE")]
    pub notifications_max_batch_size: usize,
    /// Delivery attempts per batch before a ban.
    ///
    /// Environment variable: `NOTIFICATIONS_MAX_RETRIES`
    #[serde(default = "default_max_retries", alias = "NOTIFICATIONS_MAX_RETRIES")]
    pub notifications_max_retries: u32,
    /// Pause between delivery attempts in milliseconds.
    ///
    /// Environment variable: `NOTIFICATIONS_RETRY_DELAY_MS`
    #[serde(default = "default_retry_delay_ms", alias = "NOTIFICATIONS_RETRY_DELAY_MS")]
    pub notifications_retry_delay_ms: u64,
    /// Ban length in seconds.
    ///
    /// Environment variable: `NOTIFICATIONS_BAN_DURATION_SECS`
    #[serde(default = "default_ban_duration_secs", alias = "NOTIFICATIONS_BAN_DURATION_SECS")]
    pub notifications_ban_duration_secs: u64,
    /// Timeout of one delivery attempt in seconds.
    ///
    /// Environment variable: `NOTIFICATIONS_HTTP_TIMEOUT_SECS`
    #[serde(default = "default_http_timeout_secs", alias = "NOTIFICATIONS_HTTP_TIMEOUT_SECS")]
    pub notifications_http_timeout_secs: u64,
    /// How long shutdown waits for notifiers in seconds.
    ///
    /// Environment variable: `NOTIFICATIONS_SHUTDOWN_TIMEOUT_SECS`
    #[serde(default = "default_shutdown_timeout_secs", alias = "NOTIFICATIONS_SHUTDOWN_TIMEOUT_SECS")]
    pub notifications_shutdown_timeout_secs: u64,

    // Logging
    /// Log level configuration.
    ///
    /// Environment variable: `RUST_LOG`
    #[serde(default = "default_log_level", alias = "RUST_LOG")]
    pub rust_log: String,
}

impl Config {
    /// Load configuration from defaults, config file, and environment variable
    /// overrides.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be parsed or [`Config::validate`] rejects it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Convert to the notification engine's option set.
    pub fn to_notifications_config(&self) -> NotificationsConfig {
        NotificationsConfig {
            enabled: self.notifications_enabled,
            reconcile_interval: Duration::from_millis(self.notifications_reconcile_interval_ms),
            ingress_capacity: self.notifications_ingress_capacity,
            egress_capacity: self.notifications_egress_capacity,
            max_batch_size: self.notifications_max_batch_size,
            max_retries: self.notifications_max_retries,
            retry_delay: Duration::from_millis(self.notifications_retry_delay_ms),
            ban_duration: Duration::from_secs(self.notifications_ban_duration_secs),
            http_timeout: Duration::from_secs(self.notifications_http_timeout_secs),
            shutdown_timeout: Duration::from_secs(self.notifications_shutdown_timeout_secs),
        }
    }

    /// Request timeout for the HTTP server.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Parse server socket address from host and port configuration.
    ///
    /// # Errors
    ///
    /// Fails when host and port do not form a socket address.
    pub fn parse_server_addr(&self) -> Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.host, self.port);
        SocketAddr::from_str(&addr_str).context("Invalid server address")
    }

    /// Get database URL with password masked for logging.
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let mut masked = self.database_url.clone();
                masked.replace_range(colon_pos + 1..at_pos, "***");
                return masked;
            }
        }
        self.database_url.clone()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Names the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be greater than 0");
        }

        if self.database_max_connections == 0 {
            anyhow::bail!("database max_connections must be greater than 0");
        }

        if self.database_min_connections > self.database_max_connections {
            anyhow::bail!("database min_connections cannot exceed max_connections");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.admin_key.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("admin_key must not be empty when set");
        }

        self.to_notifications_config()
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("invalid notifications settings")?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            database_max_connections: default_max_connections(),
            database_min_connections: default_min_connections(),
            database_connection_timeout: default_acquire_timeout(),
            database_idle_timeout: default_idle_timeout(),
            database_max_lifetime: default_max_lifetime(),
            host: default_host(),
            port: default_port(),
            request_timeout: default_request_timeout(),
            admin_key: None,
            notifications_enabled: false,
            notifications_reconcile_interval_ms: default_reconcile_interval_ms(),
            notifications_ingress_capacity: default_ingress_capacity(),
            notifications_egress_capacity: default_egress_capacity(),
            notifications_max_batch_size: default_max_batch_size(),
            notifications_max_retries: default_max_retries(),
            notifications_retry_delay_ms: default_retry_delay_ms(),
            notifications_ban_duration_secs: default_ban_duration_secs(),
            notifications_http_timeout_secs: default_http_timeout_secs(),
            notifications_shutdown_timeout_secs: default_shutdown_timeout_secs(),
            rust_log: default_log_level(),
        }
    }
}

fn default_database_url() -> String {
    "postgresql://localhost/spvwallet".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_max_lifetime() -> u64 {
    1800
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3003
}

fn default_request_timeout() -> u64 {
    30
}

fn default_reconcile_interval_ms() -> u64 {
    5_000
}

fn default_ingress_capacity() -> usize {
    spvwallet_notify::DEFAULT_INGRESS_CAPACITY
}

fn default_egress_capacity() -> usize {
    spvwallet_notify::DEFAULT_EGRESS_CAPACITY
}

fn default_max_batch_size() -> usize {
    spvwallet_notify::DEFAULT_MAX_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_ban_duration_secs() -> u64 {
    60 * 60
}

fn default_http_timeout_secs() -> u64 {
    20
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}
