//! Mapping between table rows and domain types.

use sqlx::Row;
use sqlx::postgres::PgRow;
use ticketlock_core::inventory::{InventoryKind, InventoryUnit, SeatDescriptor, SeatStatus, UnitId};
use ticketlock_core::performance::{Performance, PerformanceId};
use ticketlock_core::reservation::{RequesterId, ReservationId, ReservationRecord};
use ticketlock_core::store::StoreError;

/// Column list matching [`unit_from_row`].
pub const UNIT_COLUMNS: &str =
    "id, performance_id, title, kind, available_quantity, status, seat_label, version";

/// Column list matching [`reservation_from_row`].
pub const RESERVATION_COLUMNS: &str = "id, unit_id, requester_id, requester_name, created_at";

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::CorruptRow(format!("column {name}: {e}")))
}

/// Decode an `inventory_units` row.
pub fn unit_from_row(row: &PgRow) -> Result<InventoryUnit, StoreError> {
    let id = UnitId::new(column(row, "id")?);
    let kind: String = column(row, "kind")?;

    let kind = match kind.as_str() {
        "quantity" => {
            let available: i32 = column(row, "available_quantity")?;
            let available_quantity = u32::try_from(available).map_err(|_| {
                StoreError::CorruptRow(format!("unit {id} has negative quantity {available}"))
            })?;
            InventoryKind::Quantity { available_quantity }
        }
        "seat" => {
            let status: String = column(row, "status")?;
            let status = SeatStatus::parse(&status).ok_or_else(|| {
                StoreError::CorruptRow(format!("unit {id} has unknown seat status {status}"))
            })?;
            let label: String = column(row, "seat_label")?;
            InventoryKind::Seat {
                status,
                seat: SeatDescriptor::new(label),
            }
        }
        other => {
            return Err(StoreError::CorruptRow(format!(
                "unit {id} has unknown kind {other}"
            )));
        }
    };

    Ok(InventoryUnit {
        id,
        performance_id: column::<Option<i64>>(row, "performance_id")?.map(PerformanceId::new),
        title: column(row, "title")?,
        kind,
        version: column(row, "version")?,
    })
}

/// Decode a `reservations` row.
pub fn reservation_from_row(row: &PgRow) -> Result<ReservationRecord, StoreError> {
    Ok(ReservationRecord {
        id: ReservationId::from_uuid(column(row, "id")?),
        unit_id: UnitId::new(column(row, "unit_id")?),
        requester_id: RequesterId::new(column::<String>(row, "requester_id")?),
        requester_name: column(row, "requester_name")?,
        created_at: column(row, "created_at")?,
    })
}

/// Decode a `performances` row.
pub fn performance_from_row(row: &PgRow) -> Result<Performance, StoreError> {
    Ok(Performance {
        id: PerformanceId::new(column(row, "id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        start_at: column(row, "start_at")?,
    })
}

/// Column values for the mutable part of a unit:
/// `(available_quantity, status, seat_label)`.
pub fn kind_columns(kind: &InventoryKind) -> Result<(Option<i32>, Option<&'static str>, Option<&str>), StoreError> {
    match kind {
        InventoryKind::Quantity { available_quantity } => {
            let quantity = i32::try_from(*available_quantity).map_err(|_| {
                StoreError::DatabaseError(format!("quantity {available_quantity} exceeds i32::MAX"))
            })?;
            Ok((Some(quantity), None, None))
        }
        InventoryKind::Seat { status, seat } => Ok((None, Some(status.as_str()), Some(seat.as_str()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_kind_maps_to_quantity_column_only() {
        let kind = InventoryKind::Quantity {
            available_quantity: 7,
        };
        assert_eq!(kind_columns(&kind), Ok((Some(7), None, None)));
    }

    #[test]
    fn seat_kind_maps_to_status_and_label() {
        let kind = InventoryKind::Seat {
            status: SeatStatus::Booked,
            seat: SeatDescriptor::new("Seat-3"),
        };
        assert_eq!(kind_columns(&kind), Ok((None, Some("BOOKED"), Some("Seat-3"))));
    }

    #[test]
    fn oversized_quantity_is_rejected() {
        let kind = InventoryKind::Quantity {
            available_quantity: u32::MAX,
        };
        assert!(matches!(kind_columns(&kind), Err(StoreError::DatabaseError(_))));
    }
}
