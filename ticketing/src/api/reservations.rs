//! Reservation API endpoints.
//!
//! - POST /api/v1/tickets/:ticket_id/reserve?userId=&userName= - Reserve one unit
//! - GET /api/v1/tickets/my?userId= - List a requester's reservations
//! - GET /api/v1/tickets/:ticket_id - Ticket stock and sold count
//!
//! Every reservation runs under the unit's distributed lock; see
//! [`ReservationCoordinator`](crate::coordinator::ReservationCoordinator).

use crate::server::error::AppError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::coordinator::TicketStatus;
use ticketlock_core::inventory::{InventoryKind, UnitId};
use ticketlock_core::reservation::{RequesterId, ReservationRecord};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters identifying the requester of a reservation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveParams {
    /// Requester id
    pub user_id: String,
    /// Requester display name
    pub user_name: String,
}

/// Query parameters for listing reservations.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MyReservationsParams {
    /// Requester id
    pub user_id: String,
}

/// A reservation as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    /// Reservation id
    pub id: String,
    /// Reserved ticket
    pub ticket_id: i64,
    /// Requester id
    pub user_id: String,
    /// Requester display name
    pub user_name: String,
    /// When the reservation was made
    pub created_at: DateTime<Utc>,
}

impl From<ReservationRecord> for ReservationResponse {
    fn from(record: ReservationRecord) -> Self {
        Self {
            id: record.id.to_string(),
            ticket_id: record.unit_id.as_i64(),
            user_id: record.requester_id.as_str().to_string(),
            user_name: record.requester_name,
            created_at: record.created_at,
        }
    }
}

/// Stock and sales of one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStatusResponse {
    /// Ticket id
    pub ticket_id: i64,
    /// Ticket title
    pub title: String,
    /// Units still for sale
    pub remaining: u32,
    /// Seat label, for seat tickets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seat: Option<String>,
    /// Reservations sold so far
    pub reservations: u64,
}

impl From<TicketStatus> for TicketStatusResponse {
    fn from(status: TicketStatus) -> Self {
        let seat = match &status.unit.kind {
            InventoryKind::Seat { seat, .. } => Some(seat.as_str().to_string()),
            InventoryKind::Quantity { .. } => None,
        };
        Self {
            ticket_id: status.unit.id.as_i64(),
            remaining: status.unit.remaining(),
            title: status.unit.title,
            seat,
            reservations: status.reservations,
        }
    }
}

fn requester(user_id: &str) -> Result<RequesterId, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::bad_request("userId must not be blank"));
    }
    Ok(RequesterId::new(user_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// Reserve one unit of a ticket.
///
/// # Example
///
/// ```bash
/// curl -X POST 'http://localhost:8080/api/v1/tickets/42/reserve?userId=u-1&userName=Ada'
/// ```
///
/// # Errors
///
/// - 400 `BAD_REQUEST`: blank `userId`
/// - 404 `NOT_FOUND`: unknown ticket
/// - 409 `BUSY`: the ticket is locked by another request, retry
/// - 409 `OUT_OF_STOCK` / `ALREADY_RESERVED`: nothing left to sell
/// - 500 `SYSTEM_FAULT`: lock store or database failure
pub async fn reserve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    Query(params): Query<ReserveParams>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let requester_id = requester(&params.user_id)?;

    let record = state
        .coordinator
        .reserve(UnitId::new(ticket_id), &requester_id, &params.user_name)
        .await?;

    Ok((StatusCode::CREATED, Json(record.into())))
}

/// List every reservation made by a requester, oldest first.
///
/// # Errors
///
/// - 400 `BAD_REQUEST`: blank `userId`
/// - 500 `SYSTEM_FAULT`: database failure
pub async fn list_my_reservations(
    State(state): State<AppState>,
    Query(params): Query<MyReservationsParams>,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    let requester_id = requester(&params.user_id)?;

    let records = state.coordinator.list_reservations(&requester_id).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Show a ticket's remaining stock and how many reservations it has.
///
/// # Errors
///
/// - 404 `NOT_FOUND`: unknown ticket
/// - 500 `SYSTEM_FAULT`: database failure
pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
) -> Result<Json<TicketStatusResponse>, AppError> {
    let status = state.coordinator.ticket_status(UnitId::new(ticket_id)).await?;
    Ok(Json(status.into()))
}
