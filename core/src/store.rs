//! Inventory storage abstraction.
//!
//! The reservation flow needs exactly one thing from storage: an atomic unit of
//! work covering "read the unit, write the consumed unit, insert the record".
//! [`InventoryStore::begin`] opens such a unit of work as an
//! [`InventoryTransaction`]; it becomes visible to others only on
//! [`InventoryTransaction::commit`]. Dropping a transaction without committing
//! rolls it back.
//!
//! # Lost-update protection
//!
//! The distributed lock is the primary defense against concurrent writers. As a
//! second line, [`InventoryTransaction::save_unit`] only writes if the stored
//! row still has the version that was loaded, and fails with
//! [`StoreError::Conflict`] otherwise.
//!
//! # Implementations
//!
//! - `PostgresInventoryStore` (in `ticketlock-postgres`): production
//! - `InMemoryInventoryStore` (in `ticketlock-testing`): fast, deterministic tests

use crate::inventory::{InventoryUnit, NewInventoryUnit, UnitId};
use crate::performance::{NewPerformance, Performance, PerformanceId};
use crate::reservation::{RequesterId, ReservationRecord};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The unit changed since it was loaded in this transaction.
    #[error("Concurrent modification of inventory unit {unit_id}")]
    Conflict {
        /// Unit whose version no longer matches
        unit_id: UnitId,
    },

    /// Referenced performance does not exist.
    #[error("Performance {0} not found")]
    PerformanceNotFound(PerformanceId),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be mapped to a domain type.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Boxed future returned by storage methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// One atomic unit of work against the inventory store.
pub trait InventoryTransaction: Send {
    /// Load a unit inside this transaction.
    ///
    /// Returns `Ok(None)` if the unit doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn load_unit(&mut self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>>;

    /// Write a unit loaded by this transaction.
    ///
    /// Succeeds only if the stored version still equals `unit.version`; returns
    /// the unit with its new version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`]: the row changed since it was loaded
    /// - [`StoreError::DatabaseError`]: the update failed
    fn save_unit<'a>(&'a mut self, unit: &'a InventoryUnit) -> StoreFuture<'a, InventoryUnit>;

    /// Insert a reservation record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the insert fails.
    fn insert_reservation<'a>(&'a mut self, record: &'a ReservationRecord) -> StoreFuture<'a, ()>;

    /// Make every write of this transaction visible atomically.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`]: a concurrent writer got there first
    /// - [`StoreError::DatabaseError`]: the commit failed
    fn commit(self: Box<Self>) -> StoreFuture<'static, ()>;
}

/// Transactional store for inventory units and reservation records.
pub trait InventoryStore: Send + Sync {
    /// Open a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if no connection is available.
    fn begin(&self) -> StoreFuture<'_, Box<dyn InventoryTransaction>>;

    /// Read a unit outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn find_unit(&self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>>;

    /// All reservations made by a requester, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn reservations_for_requester<'a>(
        &'a self,
        requester_id: &'a RequesterId,
    ) -> StoreFuture<'a, Vec<ReservationRecord>>;

    /// Number of reservations recorded against a unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn count_reservations_for_unit(&self, unit_id: UnitId) -> StoreFuture<'_, u64>;
}

/// Administrative writes: creating performances and inventory.
pub trait InventoryAdmin: Send + Sync {
    /// Create a performance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the insert fails.
    fn create_performance<'a>(&'a self, new: &'a NewPerformance) -> StoreFuture<'a, Performance>;

    /// Look up a performance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn find_performance(&self, id: PerformanceId) -> StoreFuture<'_, Option<Performance>>;

    /// Create inventory units in one transaction.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PerformanceNotFound`]: a unit references a missing performance
    /// - [`StoreError::DatabaseError`]: the insert failed (nothing is created)
    fn create_units(&self, units: Vec<NewInventoryUnit>) -> StoreFuture<'_, Vec<InventoryUnit>>;

    /// All units of a performance, by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    fn units_for_performance(&self, id: PerformanceId) -> StoreFuture<'_, Vec<InventoryUnit>>;
}
