//! Reservation failure taxonomy.
//!
//! Every outcome of a reservation attempt other than a persisted record maps to
//! exactly one [`ReservationError`] variant. Only [`ReservationError::Busy`] is
//! worth retrying: the other variants either cannot change by retrying
//! (`NotFound`, `OutOfStock`, `AlreadyReserved`) or indicate broken
//! infrastructure (`SystemFault`).

use crate::inventory::UnitId;
use crate::lock::LockError;
use crate::store::StoreError;
use thiserror::Error;

/// Result type alias for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Classified failure of a reservation attempt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// The unit's lock could not be obtained in time.
    #[error("Too many concurrent requests for unit {unit_id}, please retry")]
    Busy {
        /// Contended unit
        unit_id: UnitId,
    },

    /// The unit does not exist.
    #[error("Inventory unit {unit_id} not found")]
    NotFound {
        /// Missing unit
        unit_id: UnitId,
    },

    /// A quantity unit has nothing left.
    #[error("Inventory unit {unit_id} is sold out")]
    OutOfStock {
        /// Sold-out unit
        unit_id: UnitId,
    },

    /// A seat unit has already been booked.
    #[error("Seat {unit_id} is already reserved")]
    AlreadyReserved {
        /// Booked seat
        unit_id: UnitId,
    },

    /// Lock store, storage engine, or an interrupted wait failed.
    #[error("System fault: {0}")]
    SystemFault(String),
}

impl ReservationError {
    /// Whether the caller may retry the same request and reasonably expect a
    /// different outcome.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Whether this is a business-rule rejection rather than a system problem.
    #[must_use]
    pub const fn is_business_failure(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::OutOfStock { .. } | Self::AlreadyReserved { .. }
        )
    }

    /// Stable machine-readable code, used for HTTP bodies and metric labels.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Busy { .. } => "BUSY",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::OutOfStock { .. } => "OUT_OF_STOCK",
            Self::AlreadyReserved { .. } => "ALREADY_RESERVED",
            Self::SystemFault(_) => "SYSTEM_FAULT",
        }
    }
}

impl From<LockError> for ReservationError {
    fn from(err: LockError) -> Self {
        Self::SystemFault(err.to_string())
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        Self::SystemFault(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_busy_is_retryable() {
        let unit_id = UnitId::new(1);
        assert!(ReservationError::Busy { unit_id }.is_retryable());
        assert!(!ReservationError::NotFound { unit_id }.is_retryable());
        assert!(!ReservationError::OutOfStock { unit_id }.is_retryable());
        assert!(!ReservationError::AlreadyReserved { unit_id }.is_retryable());
        assert!(!ReservationError::SystemFault("boom".into()).is_retryable());
    }

    #[test]
    fn business_failures_are_not_system_faults() {
        let unit_id = UnitId::new(9);
        assert!(ReservationError::OutOfStock { unit_id }.is_business_failure());
        assert!(!ReservationError::Busy { unit_id }.is_business_failure());
        assert!(!ReservationError::SystemFault("x".into()).is_business_failure());
    }

    #[test]
    fn infrastructure_errors_become_system_faults() {
        let err: ReservationError = LockError::Connection("refused".into()).into();
        assert_eq!(err.code(), "SYSTEM_FAULT");
        assert!(err.to_string().contains("refused"));

        let err: ReservationError = StoreError::Conflict { unit_id: UnitId::new(2) }.into();
        assert!(matches!(err, ReservationError::SystemFault(_)));
    }
}
