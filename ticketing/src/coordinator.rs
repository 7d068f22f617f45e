//! Reservation transaction coordinator.
//!
//! [`ReservationCoordinator::reserve`] is the whole critical path of a sale:
//!
//! ```text
//! acquire lock(unit) ──► begin ─► load ─► consume ─► save ─► insert record ─► commit
//!        │                 └──────────── any error: rollback (drop) ───────────┘
//!        └────────────────────────── release lock on every exit ──────────────────►
//! ```
//!
//! The lock keeps same-unit reservations mutually exclusive across instances;
//! the storage transaction keeps the decrement and the record all-or-nothing.

use crate::lock_facade::LockFacade;
use crate::metrics;
use std::sync::Arc;
use ticketlock_core::environment::Clock;
use ticketlock_core::error::ReservationError;
use ticketlock_core::inventory::{InventoryUnit, UnitId};
use ticketlock_core::reservation::{RequesterId, ReservationRecord};
use ticketlock_core::store::InventoryStore;

/// Runs reservations under the unit lock.
#[derive(Clone)]
pub struct ReservationCoordinator {
    facade: LockFacade,
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl ReservationCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(facade: LockFacade, store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            facade,
            store,
            clock,
        }
    }

    /// The lock facade in use.
    #[must_use]
    pub const fn facade(&self) -> &LockFacade {
        &self.facade
    }

    /// Reserve one unit of `unit_id` for a requester.
    ///
    /// Exactly one record is persisted on success and none on failure. The
    /// unit's lock is released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::Busy`]: the unit's lock was not obtained
    /// - [`ReservationError::NotFound`]: no such unit
    /// - [`ReservationError::OutOfStock`] / [`ReservationError::AlreadyReserved`]: nothing left
    /// - [`ReservationError::SystemFault`]: lock store or storage failure
    pub async fn reserve(
        &self,
        unit_id: UnitId,
        requester_id: &RequesterId,
        requester_name: &str,
    ) -> Result<ReservationRecord, ReservationError> {
        let guard = match self.facade.acquire(unit_id).await {
            Ok(guard) => guard,
            Err(e) => {
                let result = Err(e);
                metrics::record_reservation(&result);
                return result;
            }
        };

        let result = self.run_transaction(unit_id, requester_id, requester_name).await;

        let lease_lost = guard.lease_lost();
        guard.release().await;
        if lease_lost {
            metrics::record_lease_lost();
            tracing::warn!(
                unit_id = %unit_id,
                requester_id = %requester_id,
                "Lock lease was lost during the critical section"
            );
        }

        match &result {
            Ok(record) => tracing::info!(
                unit_id = %unit_id,
                requester_id = %requester_id,
                reservation_id = %record.id,
                "Reservation created"
            ),
            Err(e) if e.is_business_failure() => tracing::info!(
                unit_id = %unit_id,
                requester_id = %requester_id,
                reason = e.code(),
                "Reservation rejected"
            ),
            Err(e) => tracing::error!(
                unit_id = %unit_id,
                requester_id = %requester_id,
                error = %e,
                "Reservation failed"
            ),
        }
        metrics::record_reservation(&result);
        result
    }

    /// Load, consume, persist and record inside one storage transaction.
    async fn run_transaction(
        &self,
        unit_id: UnitId,
        requester_id: &RequesterId,
        requester_name: &str,
    ) -> Result<ReservationRecord, ReservationError> {
        let mut tx = self.store.begin().await?;

        let mut unit = tx
            .load_unit(unit_id)
            .await?
            .ok_or(ReservationError::NotFound { unit_id })?;
        unit.consume()?;
        tx.save_unit(&unit).await?;

        let record = ReservationRecord::new(
            unit_id,
            requester_id.clone(),
            requester_name,
            self.clock.now(),
        );
        tx.insert_reservation(&record).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Every reservation a requester holds, oldest first. Takes no lock.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::SystemFault`] if the store fails.
    pub async fn list_reservations(
        &self,
        requester_id: &RequesterId,
    ) -> Result<Vec<ReservationRecord>, ReservationError> {
        Ok(self.store.reservations_for_requester(requester_id).await?)
    }

    /// Current state of a unit and how many reservations it has sold.
    /// Takes no lock.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`]: no such unit
    /// - [`ReservationError::SystemFault`]: the store failed
    pub async fn ticket_status(&self, unit_id: UnitId) -> Result<TicketStatus, ReservationError> {
        let unit = self
            .store
            .find_unit(unit_id)
            .await?
            .ok_or(ReservationError::NotFound { unit_id })?;
        let reservations = self.store.count_reservations_for_unit(unit_id).await?;
        Ok(TicketStatus { unit, reservations })
    }
}

/// Snapshot of a unit with its sold count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketStatus {
    /// The unit as last committed
    pub unit: InventoryUnit,
    /// Reservations recorded against it
    pub reservations: u64,
}

impl std::fmt::Debug for ReservationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationCoordinator")
            .field("facade", &self.facade)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::lock_facade::LockStrategy;
    use ticketlock_testing::helpers::{quantity_unit, seat_unit};
    use ticketlock_testing::{InMemoryInventoryStore, InMemoryLock, test_clock};

    fn coordinator(
        store: &InMemoryInventoryStore,
        lock: &InMemoryLock,
    ) -> ReservationCoordinator {
        ReservationCoordinator::new(
            LockFacade::new(Arc::new(lock.clone()), LockStrategy::best_effort()),
            Arc::new(store.clone()),
            Arc::new(test_clock()),
        )
    }

    #[tokio::test]
    async fn reserve_decrements_and_records() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        store.insert_unit(quantity_unit(1, 2));
        let coordinator = coordinator(&store, &lock);

        let record = coordinator
            .reserve(UnitId::new(1), &RequesterId::new("alice"), "Alice")
            .await
            .unwrap();

        assert_eq!(record.unit_id, UnitId::new(1));
        assert_eq!(record.requester_name, "Alice");
        assert_eq!(record.created_at, test_clock().now());
        assert_eq!(store.unit(UnitId::new(1)).unwrap().remaining(), 1);
        assert_eq!(store.reservations(), vec![record]);
        assert!(!lock.is_locked(&coordinator.facade().key_for(UnitId::new(1))));
    }

    #[tokio::test]
    async fn missing_unit_is_not_found_and_releases_lock() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        let coordinator = coordinator(&store, &lock);

        let err = coordinator
            .reserve(UnitId::new(404), &RequesterId::new("alice"), "Alice")
            .await
            .unwrap_err();

        assert_eq!(err, ReservationError::NotFound { unit_id: UnitId::new(404) });
        assert!(!lock.is_locked(&coordinator.facade().key_for(UnitId::new(404))));
    }

    #[tokio::test]
    async fn sold_out_units_leave_no_record() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        store.insert_unit(quantity_unit(1, 0));
        store.insert_unit(seat_unit(2, "Seat-1"));
        let coordinator = coordinator(&store, &lock);
        let bob = RequesterId::new("bob");

        let err = coordinator.reserve(UnitId::new(1), &bob, "Bob").await.unwrap_err();
        assert_eq!(err, ReservationError::OutOfStock { unit_id: UnitId::new(1) });

        coordinator.reserve(UnitId::new(2), &bob, "Bob").await.unwrap();
        let err = coordinator.reserve(UnitId::new(2), &bob, "Bob").await.unwrap_err();
        assert_eq!(err, ReservationError::AlreadyReserved { unit_id: UnitId::new(2) });

        assert_eq!(store.reservations().len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_rolls_back_and_releases() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        store.insert_unit(quantity_unit(1, 5));
        store.fail_commits(true);
        let coordinator = coordinator(&store, &lock);

        let err = coordinator
            .reserve(UnitId::new(1), &RequesterId::new("carol"), "Carol")
            .await
            .unwrap_err();

        assert!(matches!(err, ReservationError::SystemFault(_)));
        assert_eq!(store.unit(UnitId::new(1)).unwrap().remaining(), 5);
        assert!(store.reservations().is_empty());
        assert!(!lock.is_locked(&coordinator.facade().key_for(UnitId::new(1))));
    }

    #[tokio::test]
    async fn history_lists_only_the_requesters_records() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        store.insert_unit(quantity_unit(1, 10));
        let coordinator = coordinator(&store, &lock);

        coordinator.reserve(UnitId::new(1), &RequesterId::new("a"), "A").await.unwrap();
        coordinator.reserve(UnitId::new(1), &RequesterId::new("b"), "B").await.unwrap();
        coordinator.reserve(UnitId::new(1), &RequesterId::new("a"), "A").await.unwrap();

        let history = coordinator.list_reservations(&RequesterId::new("a")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|r| r.requester_id.as_str() == "a"));
    }

    #[tokio::test]
    async fn ticket_status_counts_sales() {
        let (store, lock) = (InMemoryInventoryStore::new(), InMemoryLock::new());
        store.insert_unit(quantity_unit(1, 3));
        let coordinator = coordinator(&store, &lock);

        for name in ["a", "b"] {
            coordinator
                .reserve(UnitId::new(1), &RequesterId::new(name), name)
                .await
                .unwrap();
        }

        let status = coordinator.ticket_status(UnitId::new(1)).await.unwrap();
        assert_eq!(status.unit.remaining(), 1);
        assert_eq!(status.reservations, 2);

        let err = coordinator.ticket_status(UnitId::new(9)).await.unwrap_err();
        assert_eq!(err, ReservationError::NotFound { unit_id: UnitId::new(9) });
    }
}
