//! Lock strategy selection.
//!
//! A deployment runs exactly one [`LockStrategy`]. The [`LockFacade`] applies it
//! to a unit, turns contention into [`ReservationError::Busy`] and lock-store
//! failures into [`ReservationError::SystemFault`], and hands back a
//! [`LockGuard`] for the critical section.

use crate::metrics;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use ticketlock_core::error::ReservationError;
use ticketlock_core::inventory::UnitId;
use ticketlock_core::lock::{DEFAULT_KEY_PREFIX, DistributedLock, LockGuard, LockKey, LockOwner};

/// How the facade acquires a unit's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrategy {
    /// One set-if-absent attempt; the lease bounds the hold and is never renewed.
    BestEffort {
        /// Lease set on the lock
        lease: Duration,
    },
    /// Wait up to `max_wait`, then hold with a watchdog-renewed lease.
    Patient {
        /// Longest time to wait for the lock
        max_wait: Duration,
        /// Lease renewed every `lease / 3` while held
        lease: Duration,
    },
}

impl LockStrategy {
    /// Best-effort with a 5 second lease.
    #[must_use]
    pub const fn best_effort() -> Self {
        Self::BestEffort {
            lease: Duration::from_secs(5),
        }
    }

    /// Patient with a 10 second wait and a 1 second lease.
    #[must_use]
    pub const fn patient() -> Self {
        Self::Patient {
            max_wait: Duration::from_secs(10),
            lease: Duration::from_secs(1),
        }
    }

    /// Metric label for this strategy.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BestEffort { .. } => "best_effort",
            Self::Patient { .. } => "patient",
        }
    }

    /// Lease the lock is taken with.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        match self {
            Self::BestEffort { lease } | Self::Patient { lease, .. } => *lease,
        }
    }
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies the configured [`LockStrategy`] to units.
#[derive(Clone)]
pub struct LockFacade {
    lock: Arc<dyn DistributedLock>,
    strategy: LockStrategy,
    key_prefix: String,
}

impl LockFacade {
    /// Create a facade with the default key prefix (`lock:unit:`).
    #[must_use]
    pub fn new(lock: Arc<dyn DistributedLock>, strategy: LockStrategy) -> Self {
        Self {
            lock,
            strategy,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Use a different key namespace.
    #[must_use]
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Strategy in use.
    #[must_use]
    pub const fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// Lock key guarding `unit_id`.
    #[must_use]
    pub fn key_for(&self, unit_id: UnitId) -> LockKey {
        LockKey::for_unit(&self.key_prefix, unit_id)
    }

    /// Acquire the lock for `unit_id` under a fresh owner token.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::Busy`]: another owner held the lock for the whole attempt
    /// - [`ReservationError::SystemFault`]: the lock store failed or the wait was
    ///   interrupted (any partial hold is released first)
    pub async fn acquire(&self, unit_id: UnitId) -> Result<LockGuard, ReservationError> {
        let key = self.key_for(unit_id);
        let owner = LockOwner::new();
        let started = Instant::now();

        let attempt = match self.strategy {
            LockStrategy::BestEffort { lease } => {
                self.lock.try_acquire_once(&key, &owner, lease).await
            }
            LockStrategy::Patient { max_wait, lease } => {
                self.lock.acquire_blocking(&key, &owner, max_wait, lease).await
            }
        };
        metrics::record_lock_wait(self.strategy.name(), started.elapsed());

        match attempt {
            Ok(true) => {
                tracing::debug!(unit_id = %unit_id, owner = %owner, strategy = %self.strategy, "Lock acquired");
                let guard = LockGuard::new(Arc::clone(&self.lock), key, owner);
                Ok(match self.strategy {
                    LockStrategy::Patient { lease, .. } => guard.with_watchdog(lease),
                    LockStrategy::BestEffort { .. } => guard,
                })
            }
            Ok(false) => {
                tracing::warn!(unit_id = %unit_id, strategy = %self.strategy, "Lock busy");
                Err(ReservationError::Busy { unit_id })
            }
            Err(e) => {
                tracing::error!(unit_id = %unit_id, owner = %owner, error = %e, "Lock acquisition failed");
                // No guard exists until the store replies. If this future is
                // dropped after the store granted the lock but before the reply
                // arrives, nothing releases it and the hold lasts one lease.
                if let Err(release_err) = self.lock.release(&key, &owner).await {
                    tracing::warn!(
                        unit_id = %unit_id,
                        owner = %owner,
                        error = %release_err,
                        "Release after failed acquisition failed"
                    );
                }
                Err(ReservationError::SystemFault(format!(
                    "Failed to acquire lock for unit {unit_id}: {e}"
                )))
            }
        }
    }
}

impl fmt::Debug for LockFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockFacade")
            .field("strategy", &self.strategy)
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}
