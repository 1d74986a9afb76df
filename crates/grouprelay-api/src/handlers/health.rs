//! Health check handlers for service monitoring.
//!
//! `/health` reports group store connectivity, whether a sink is configured
//! and the engine counters. `/` and `/live` never touch dependencies.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use grouprelay_core::{Clock, GroupStore};
use grouprelay_delivery::StatsSnapshot;
use serde::Serialize;
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
    /// Engine counters since startup
    pub engine: StatsSnapshot,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Running, but deliveries cannot succeed
    Degraded,
    /// Group store unreachable
    Unhealthy,
}

/// Individual component health check results.
#[derive(Debug, Serialize)]
pub struct HealthChecks {
    /// Group store connectivity
    pub store: ComponentHealth,
    /// Sink configuration
    pub sink: ComponentHealth,
}

/// Health status for individual components.
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    /// Component status
    pub status: ComponentStatus,
    /// Optional error message if unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Response time in milliseconds, for components that were probed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

/// Component-level health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is healthy
    Up,
    /// Component is unavailable or missing
    Down,
}

/// Health service that encapsulates clock dependency for testable health
/// checks.
pub struct HealthService {
    clock: Arc<dyn Clock>,
}

impl HealthService {
    /// Creates a new health service with the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Performs service health checks.
    pub async fn health_check(
        &self,
        store: &dyn GroupStore,
        sink_configured: bool,
        engine: StatsSnapshot,
    ) -> HealthResponse {
        debug!("Performing health check");

        let timestamp = self.clock.now_utc();
        let store_health = self.check_store_health(store).await;

        let sink_health = if sink_configured {
            ComponentHealth { status: ComponentStatus::Up, message: None, response_time_ms: None }
        } else {
            ComponentHealth {
                status: ComponentStatus::Down,
                message: Some("sink URL is not configured".to_string()),
                response_time_ms: None,
            }
        };

        let status = match (store_health.status, sink_health.status) {
            (ComponentStatus::Down, _) => HealthStatus::Unhealthy,
            (ComponentStatus::Up, ComponentStatus::Down) => HealthStatus::Degraded,
            (ComponentStatus::Up, ComponentStatus::Up) => HealthStatus::Healthy,
        };

        HealthResponse {
            status,
            timestamp,
            checks: HealthChecks { store: store_health, sink: sink_health },
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Probes the group store with a lightweight round trip.
    async fn check_store_health(&self, store: &dyn GroupStore) -> ComponentHealth {
        let start_time = self.clock.now();
        let result = store.health_check().await;
        let elapsed = self.clock.now().saturating_duration_since(start_time);
        let response_time_ms = Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

        match result {
            Ok(()) => {
                debug!("Group store health check passed");
                ComponentHealth { status: ComponentStatus::Up, message: None, response_time_ms }
            },
            Err(e) => {
                error!("Group store health check failed: {}", e);
                ComponentHealth {
                    status: ComponentStatus::Down,
                    message: Some(format!("Group store unavailable: {e}")),
                    response_time_ms,
                }
            },
        }
    }
}

/// Health check endpoint handler.
#[instrument(name = "health_check", skip(app_state))]
pub async fn health_check(State(app_state): State<AppState>) -> Response {
    let health_service = HealthService::new(app_state.clock.clone());
    let response = health_service
        .health_check(
            app_state.engine.store().as_ref(),
            app_state.sink_configured,
            app_state.engine.stats(),
        )
        .await;

    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    debug!(
        status = ?response.status,
        store_status = ?response.checks.store.status,
        sink_status = ?response.checks.sink.status,
        "Health check completed"
    );

    (status_code, Json(response)).into_response()
}

/// Liveness check endpoint for orchestrator probes.
#[instrument(name = "liveness_check", skip(app_state))]
pub async fn liveness_check(State(app_state): State<AppState>) -> Response {
    let response = serde_json::json!({
        "status": "alive",
        "timestamp": app_state.clock.now_utc(),
        "service": "grouprelay"
    });

    (StatusCode::OK, Json(response)).into_response()
}

/// Plain-text banner served at `/`.
pub async fn root() -> &'static str {
    "grouprelay webhook server is running"
}
