//! Health endpoints.
//!
//! - `/health`: plain `ok` for load balancers
//! - `/live`: process is up
//! - `/ready`: the store answers a ping; 503 otherwise
//!
//! None of them require a session.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use promptlab_storage::Store;
use serde::Serialize;
use std::time::Instant;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<ComponentHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn liveness_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        store: None,
        message: Some("Service is alive".to_string()),
    })
}

/// Readiness probe: pings the store.
pub async fn readiness_check<S: Store>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let start = Instant::now();

    let store = match state.store.ping().await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            message: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Store ping failed");
            ComponentHealth {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                message: Some("Store unavailable".to_string()),
            }
        }
    };

    let status = store.status;
    let (code, message) = match status {
        HealthStatus::Healthy => (StatusCode::OK, "Service is ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Service is not ready"),
    };

    tracing::debug!(status = ?status, "Readiness check completed");

    (
        code,
        Json(HealthResponse {
            status,
            store: Some(store),
            message: Some(message.to_string()),
        }),
    )
}
