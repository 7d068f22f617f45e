//! # Ticketlock Core
//!
//! Domain types and collaborator traits for reserving finite ticket inventory
//! from many stateless service instances without overselling.
//!
//! This crate provides the pieces every other crate in the workspace agrees on:
//!
//! - **Inventory units** ([`inventory`]): quantity counters and single seats, and
//!   the one state transition that consumes a unit
//! - **Reservation records** ([`reservation`]): immutable proof of a sale
//! - **Distributed locks** ([`lock`]): the [`lock::DistributedLock`] trait and the
//!   scoped [`lock::LockGuard`] that releases on every exit path
//! - **Storage** ([`store`]): transactional inventory store traits
//! - **Errors** ([`error`]): the caller-facing reservation failure taxonomy
//!
//! ## Architecture Principles
//!
//! - Every external system (lock store, database, clock) is injected as a trait object
//! - Contention is a value (`Ok(false)`), infrastructure failure is an error
//! - Business failures never leave partial writes behind
//!
//! ## Example
//!
//! ```
//! use ticketlock_core::inventory::{InventoryKind, InventoryUnit, UnitId};
//! use ticketlock_core::error::ReservationError;
//!
//! let mut unit = InventoryUnit::quantity(UnitId::new(1), "Opening night", 1);
//! assert!(unit.consume().is_ok());
//! assert_eq!(
//!     unit.consume(),
//!     Err(ReservationError::OutOfStock { unit_id: UnitId::new(1) })
//! );
//! assert!(matches!(unit.kind, InventoryKind::Quantity { available_quantity: 0 }));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod error;
pub mod inventory;
pub mod lock;
pub mod performance;
pub mod reservation;
pub mod store;

/// Environment module - Dependency injection traits
///
/// All sources of non-determinism the reservation flow touches are abstracted
/// behind traits so tests can substitute them.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
