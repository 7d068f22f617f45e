//! # Ticketlock Testing
//!
//! Testing utilities for the ticket reservation workspace.
//!
//! This crate provides:
//! - [`InMemoryLock`]: a [`DistributedLock`](ticketlock_core::lock::DistributedLock)
//!   with real lease expiry, reentrancy and fault injection
//! - [`InMemoryInventoryStore`]: a transactional store with optimistic version checks
//! - [`FixedClock`]: deterministic time
//! - [`helpers`]: unit builders and tracing setup for tests
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ticketlock_testing::{InMemoryInventoryStore, InMemoryLock, test_clock};
//! use ticketlock_testing::helpers::quantity_unit;
//!
//! let store = InMemoryInventoryStore::new();
//! store.insert_unit(quantity_unit(1, 10));
//! let lock = Arc::new(InMemoryLock::new());
//! let clock = Arc::new(test_clock());
//! # let _ = (lock, clock);
//! ```

use chrono::{DateTime, Utc};
use ticketlock_core::environment::Clock;

pub mod lock_mocks;
pub mod store_mocks;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticketlock_testing::mocks::FixedClock;
    /// use ticketlock_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Test helpers and utilities
pub mod helpers {
    use ticketlock_core::inventory::{InventoryUnit, SeatDescriptor, UnitId};

    /// Quantity unit titled `"Unit <id>"` with `quantity` tickets.
    #[must_use]
    pub fn quantity_unit(id: i64, quantity: u32) -> InventoryUnit {
        InventoryUnit::quantity(UnitId::new(id), format!("Unit {id}"), quantity)
    }

    /// Available seat unit titled `"Seat <id>"`.
    #[must_use]
    pub fn seat_unit(id: i64, label: &str) -> InventoryUnit {
        InventoryUnit::seat(UnitId::new(id), format!("Seat {id}"), SeatDescriptor::new(label))
    }

    /// Install a test-friendly tracing subscriber (idempotent).
    ///
    /// Honors `RUST_LOG`; output is captured by the test harness.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use lock_mocks::InMemoryLock;
pub use mocks::{FixedClock, test_clock};
pub use store_mocks::InMemoryInventoryStore;
