//! Router configuration for the ticketing system.
//!
//! Builds the complete Axum router with all endpoints.

use super::error::AppError;
use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{admin, reservations};
use axum::{
    Router,
    extract::State,
    routing::{get, post},
};

/// Build the complete Axum router.
///
/// Configures:
/// - `GET /api/v1/health` and `GET /ready`
/// - Reservation endpoints under `/api/v1/tickets`
/// - Admin endpoints under `/api/v1/admin`
/// - `GET /metrics` (Prometheus text format)
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        // Reservations
        .route("/tickets/my", get(reservations::list_my_reservations))
        .route("/tickets/:ticket_id", get(reservations::get_ticket))
        .route("/tickets/:ticket_id/reserve", post(reservations::reserve_ticket))
        // Administration
        .route("/admin/performance", post(admin::create_performance))
        .route(
            "/admin/performance/:id/tickets",
            post(admin::init_tickets).get(admin::list_units),
        );

    Router::new()
        .route("/ready", get(readiness_check))
        .route("/metrics", get(render_metrics))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

/// Render the Prometheus exporter.
async fn render_metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .ok_or_else(|| AppError::unavailable("Metrics exporter not installed"))
}
