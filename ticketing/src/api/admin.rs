//! Administration API endpoints.
//!
//! - POST /api/v1/admin/performance - Create a performance (JSON body)
//! - POST /api/v1/admin/performance/:id/tickets?count=&quantity= - Create its inventory
//! - GET /api/v1/admin/performance/:id/tickets - List its inventory

use crate::admin::CreatePerformanceRequest;
use crate::server::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use ticketlock_core::inventory::InventoryUnit;
use ticketlock_core::performance::{Performance, PerformanceId};

/// Query parameters for ticket initialization.
#[derive(Debug, Deserialize)]
pub struct InitTicketsParams {
    /// Number of units to create
    pub count: u32,
    /// Tickets per unit; seats are created when absent
    pub quantity: Option<u32>,
}

/// Create a performance.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/admin/performance \
///   -H "Content-Type: application/json" \
///   -d '{"title":"Carmen","description":"Opening night","startAt":"2025-06-01T19:30:00Z"}'
/// ```
///
/// # Errors
///
/// - 400 `BAD_REQUEST`: blank title
/// - 500: database failure
pub async fn create_performance(
    State(state): State<AppState>,
    Json(request): Json<CreatePerformanceRequest>,
) -> Result<(StatusCode, Json<Performance>), AppError> {
    let performance = state.admin.create_performance(request).await?;
    Ok((StatusCode::CREATED, Json(performance)))
}

/// Create `count` units for a performance.
///
/// # Errors
///
/// - 400 `BAD_REQUEST`: `count` out of range
/// - 404 `NOT_FOUND`: unknown performance
/// - 500: database failure
pub async fn init_tickets(
    State(state): State<AppState>,
    Path(performance_id): Path<i64>,
    Query(params): Query<InitTicketsParams>,
) -> Result<(StatusCode, Json<Vec<InventoryUnit>>), AppError> {
    let units = state
        .admin
        .init_tickets(PerformanceId::new(performance_id), params.count, params.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(units)))
}

/// List a performance's units.
///
/// # Errors
///
/// - 500: database failure
pub async fn list_units(
    State(state): State<AppState>,
    Path(performance_id): Path<i64>,
) -> Result<Json<Vec<InventoryUnit>>, AppError> {
    let units = state
        .admin
        .units_for_performance(PerformanceId::new(performance_id))
        .await?;
    Ok(Json(units))
}
