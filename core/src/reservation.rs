//! Reservation records.
//!
//! A [`ReservationRecord`] is written exactly once, inside the same storage
//! transaction that consumed the inventory unit, and never modified afterwards.

use crate::inventory::UnitId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the person reserving, as supplied by the routing layer
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(String);

impl RequesterId {
    /// Create a requester id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted proof of one successful sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    /// Record identity
    pub id: ReservationId,
    /// Unit that was consumed
    pub unit_id: UnitId,
    /// Who reserved it
    pub requester_id: RequesterId,
    /// Display name of the requester
    pub requester_name: String,
    /// When the reservation was made
    pub created_at: DateTime<Utc>,
}

impl ReservationRecord {
    /// Create a record with a fresh id.
    #[must_use]
    pub fn new(
        unit_id: UnitId,
        requester_id: RequesterId,
        requester_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            unit_id,
            requester_id,
            requester_name: requester_name.into(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_get_distinct_ids() {
        let now = Utc::now();
        let a = ReservationRecord::new(UnitId::new(1), RequesterId::new("u1"), "Kim", now);
        let b = ReservationRecord::new(UnitId::new(1), RequesterId::new("u1"), "Kim", now);
        assert_ne!(a.id, b.id);
        assert_eq!(a.requester_id.as_str(), "u1");
    }
}
