//! Inventory units and the transition that consumes them.
//!
//! Two inventory models coexist in the same table:
//!
//! - **Quantity** units carry a counter that is decremented once per sale and
//!   never goes below zero.
//! - **Seat** units carry a status that flips exactly once from
//!   [`SeatStatus::Available`] to [`SeatStatus::Booked`].
//!
//! Both are driven through [`InventoryUnit::consume`], so the reservation flow
//! never needs to know which model a unit uses.
//!
//! `consume` is NOT safe to call concurrently on copies of the same row. Callers
//! must hold the unit's distributed lock, and the storage layer re-checks
//! [`InventoryUnit::version`] on write.

use crate::error::ReservationError;
use crate::performance::PerformanceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an inventory unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitId(i64);

impl UnitId {
    /// Create a `UnitId` from its storage key.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw storage key.
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Booking status of a seat unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    /// Seat can still be sold
    Available,
    /// Seat has been sold
    Booked,
}

impl SeatStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Booked => "BOOKED",
        }
    }

    /// Parse status from database string.
    ///
    /// Returns `None` if the string doesn't match a known status.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(Self::Available),
            "BOOKED" => Some(Self::Booked),
            _ => None,
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable seat position (e.g. `"Seat-12"`, `"A-7"`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatDescriptor(String);

impl SeatDescriptor {
    /// Create a seat descriptor from a label.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Get the seat label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a unit tracks what is left to sell.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InventoryKind {
    /// General admission counter
    Quantity {
        /// Units still for sale
        available_quantity: u32,
    },
    /// A single numbered seat
    Seat {
        /// Current booking status
        status: SeatStatus,
        /// Seat position
        seat: SeatDescriptor,
    },
}

impl InventoryKind {
    /// Storage discriminator for this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Quantity { .. } => "quantity",
            Self::Seat { .. } => "seat",
        }
    }
}

/// One sellable unit of inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryUnit {
    /// Unit identity
    pub id: UnitId,
    /// Performance this unit belongs to, if any
    pub performance_id: Option<PerformanceId>,
    /// Display title
    pub title: String,
    /// Quantity or seat tracking
    #[serde(flatten)]
    pub kind: InventoryKind,
    /// Row version, bumped by the store on every successful write
    pub version: i64,
}

impl InventoryUnit {
    /// Create a quantity unit at version 0.
    #[must_use]
    pub fn quantity(id: UnitId, title: impl Into<String>, available_quantity: u32) -> Self {
        Self {
            id,
            performance_id: None,
            title: title.into(),
            kind: InventoryKind::Quantity { available_quantity },
            version: 0,
        }
    }

    /// Create an available seat unit at version 0.
    #[must_use]
    pub fn seat(id: UnitId, title: impl Into<String>, seat: SeatDescriptor) -> Self {
        Self {
            id,
            performance_id: None,
            title: title.into(),
            kind: InventoryKind::Seat {
                status: SeatStatus::Available,
                seat,
            },
            version: 0,
        }
    }

    /// Attach the unit to a performance.
    #[must_use]
    pub const fn with_performance(mut self, performance_id: PerformanceId) -> Self {
        self.performance_id = Some(performance_id);
        self
    }

    /// Consume one unit of inventory.
    ///
    /// - Quantity: fails with `OutOfStock` at zero, otherwise decrements by one.
    /// - Seat: fails with `AlreadyReserved` unless available, otherwise books it.
    ///
    /// On error the unit is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::OutOfStock`] or
    /// [`ReservationError::AlreadyReserved`] when nothing is left to sell.
    pub fn consume(&mut self) -> Result<(), ReservationError> {
        match &mut self.kind {
            InventoryKind::Quantity { available_quantity } => {
                if *available_quantity == 0 {
                    return Err(ReservationError::OutOfStock { unit_id: self.id });
                }
                *available_quantity -= 1;
                Ok(())
            }
            InventoryKind::Seat { status, .. } => {
                if *status != SeatStatus::Available {
                    return Err(ReservationError::AlreadyReserved { unit_id: self.id });
                }
                *status = SeatStatus::Booked;
                Ok(())
            }
        }
    }

    /// Units still for sale (0 or 1 for seats).
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        match &self.kind {
            InventoryKind::Quantity { available_quantity } => *available_quantity,
            InventoryKind::Seat { status: SeatStatus::Available, .. } => 1,
            InventoryKind::Seat { status: SeatStatus::Booked, .. } => 0,
        }
    }

    /// Whether nothing is left to sell.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.remaining() == 0
    }
}

/// Request to create an inventory unit; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInventoryUnit {
    /// Performance the unit belongs to
    pub performance_id: Option<PerformanceId>,
    /// Display title
    pub title: String,
    /// Initial tracking state
    #[serde(flatten)]
    pub kind: InventoryKind,
}
