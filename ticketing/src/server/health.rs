//! Health check endpoints for the ticketing system.
//!
//! Provides endpoints for monitoring service health and readiness.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Health check endpoint.
///
/// Returns 200 OK with status `UP` while the process is serving. This is a
/// liveness check for the load balancer; it doesn't verify dependencies.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/api/v1/health
/// # {"status":"UP","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "UP".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Per-dependency status (`ok` or the failure)
    pub checks: BTreeMap<String, String>,
}

/// Readiness check endpoint.
///
/// Returns 200 OK if every probe passes, 503 otherwise.
///
/// # Example
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"checks":{"database":"ok","lock_store":"ok"}}
/// ```
pub async fn readiness_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let results = join_all(state.probes.iter().map(|probe| async move {
        (probe.name(), probe.check().await)
    }))
    .await;

    let mut ready = true;
    let mut checks = BTreeMap::new();
    for (name, result) in results {
        match result {
            Ok(()) => {
                checks.insert(name.to_string(), "ok".to_string());
            }
            Err(reason) => {
                tracing::warn!(dependency = name, error = %reason, "Readiness probe failed");
                ready = false;
                checks.insert(name.to_string(), reason);
            }
        }
    }

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadinessResponse { ready, checks }))
}
