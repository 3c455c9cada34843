//! Health check handlers for service monitoring.
//!
//! Provides liveness, readiness, and health endpoints reporting database
//! connectivity and the state of the notification engine.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spvwallet_core::{storage::Storage, SharedClock};
use spvwallet_notify::WebhookManager;
use tracing::{debug, error, instrument};

use crate::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Timestamp when health check was performed
    pub timestamp: DateTime<Utc>,
    /// Individual component health checks
    pub checks: HealthChecks,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some non-critical issues detected
    Degraded,
    /// Critical systems failing
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Database connectivity and basic query test
    pub database: ComponentHealth,
    /// Notification engine state
    pub notifications: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Optional error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds
    pub response_time_ms: u64,
}

/// Component-level health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is experiencing issues
    Down,
    /// Component is switched off by configuration
    Disabled,
}

impl ComponentHealth {
    fn up(response_time_ms: u64) -> Self {
        Self { status: ComponentStatus::Up, message: None, response_time_ms }
    }

    fn down(message: String, response_time_ms: u64) -> Self {
        Self { status: ComponentStatus::Down, message: Some(message), response_time_ms }
    }

    fn disabled() -> Self {
        Self { status: ComponentStatus::Disabled, message: None, response_time_ms: 0 }
    }
}

/// Health service that encapsulates the clock for testable health checks.
pub struct HealthService {
    clock: SharedClock,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Checks every component and derives the overall status.
    ///
    /// A stopped notification engine degrades the service, a failing
    /// database makes it unhealthy.
    pub async fn health_check(
        &self,
        storage: Option<&Storage>,
        notifications: Option<&WebhookManager>,
    ) -> HealthResponse {
        debug!("performing health check");

        let timestamp = self.clock.now_utc();
        let database = self.check_database(storage).await;
        let notifications = match notifications {
            None => ComponentHealth::disabled(),
            Some(manager) if manager.is_stopped() => {
                ComponentHealth::down("notification engine stopped".to_string(), 0)
            },
            Some(manager) => {
                let live = manager.status().await.notifiers;
                debug!(live_notifiers = live, "notification engine running");
                ComponentHealth::up(0)
            },
        };

        let status = match (database.status, notifications.status) {
            (ComponentStatus::Down, _) => HealthStatus::Unhealthy,
            (_, ComponentStatus::Down) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        };

        HealthResponse {
            status,
            timestamp,
            checks: HealthChecks { database, notifications },
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    async fn check_database(&self, storage: Option<&Storage>) -> ComponentHealth {
        let Some(storage) = storage else {
            return ComponentHealth::disabled();
        };

        let start = self.clock.now();
        let result = storage.health_check().await;
        let elapsed_ms = u64::try_from(self.clock.now().duration_since(start).as_millis())
            .unwrap_or(u64::MAX);

        match result {
            Ok(()) => ComponentHealth::up(elapsed_ms),
            Err(e) => {
                error!(error = %e, "database health check failed");
                ComponentHealth::down(format!("database connection failed: {e}"), elapsed_ms)
            },
        }
    }
}

/// `GET /health`.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Response {
    let response = HealthService::new(state.clock.clone())
        .health_check(state.storage.as_deref(), state.notifications.as_deref())
        .await;

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(status = ?response.status, "health check completed");
    (status_code, Json(response)).into_response()
}

/// `GET /ready`: ready once the database answers and, when enabled, the
/// notification engine runs.
#[instrument(name = "readiness_check", skip(state))]
pub async fn readiness_check(State(state): State<AppState>) -> Response {
    let response = HealthService::new(state.clock.clone())
        .health_check(state.storage.as_deref(), state.notifications.as_deref())
        .await;

    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded | HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response)).into_response()
}

/// `GET /live`: process liveness without touching dependencies.
#[instrument(name = "liveness_check", skip(state))]
pub async fn liveness_check(State(state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": state.clock.now_utc(),
        "service": "spvwallet",
    });

    (StatusCode::OK, Json(response)).into_response()
}
