//! In-memory inventory store for fast, deterministic testing.
//!
//! [`InMemoryInventoryStore`] keeps the transactional contract of the real
//! store: writes are staged inside a transaction and applied all at once on
//! commit, dropping a transaction discards them, and a commit fails with
//! [`StoreError::Conflict`] if a staged unit changed underneath it.
//!
//! Useful knobs for concurrency tests:
//! - [`InMemoryInventoryStore::with_commit_delay`]: widen the read-modify-write window
//! - [`InMemoryInventoryStore::fail_commits`]: make every commit a database error

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned mutexes

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketlock_core::inventory::{InventoryUnit, NewInventoryUnit, UnitId};
use ticketlock_core::performance::{NewPerformance, Performance, PerformanceId};
use ticketlock_core::reservation::{RequesterId, ReservationRecord};
use ticketlock_core::store::{
    InventoryAdmin, InventoryStore, InventoryTransaction, StoreError, StoreFuture,
};

#[derive(Debug, Default)]
struct State {
    units: BTreeMap<UnitId, InventoryUnit>,
    performances: BTreeMap<PerformanceId, Performance>,
    reservations: Vec<ReservationRecord>,
    last_unit_id: i64,
    last_performance_id: i64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    fail_commits: AtomicBool,
}

/// Inventory store backed by in-process maps.
///
/// Clones share the same data.
///
/// # Example
///
/// ```
/// use ticketlock_core::inventory::UnitId;
/// use ticketlock_core::store::{InventoryStore, InventoryTransaction};
/// use ticketlock_testing::InMemoryInventoryStore;
/// use ticketlock_testing::helpers::quantity_unit;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryInventoryStore::new();
/// store.insert_unit(quantity_unit(1, 3));
///
/// let mut tx = store.begin().await?;
/// let mut unit = tx.load_unit(UnitId::new(1)).await?.ok_or("missing")?;
/// unit.consume()?;
/// tx.save_unit(&unit).await?;
/// tx.commit().await?;
///
/// assert_eq!(store.unit(UnitId::new(1)).map(|u| u.remaining()), Some(2));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    shared: Arc<Shared>,
    commit_delay: Duration,
}

impl InMemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` at the start of every commit.
    #[must_use]
    pub const fn with_commit_delay(mut self, delay: Duration) -> Self {
        self.commit_delay = delay;
        self
    }

    /// Make every subsequent commit fail with a database error.
    pub fn fail_commits(&self, fail: bool) {
        self.shared.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Insert or overwrite a unit directly, bypassing transactions.
    pub fn insert_unit(&self, unit: InventoryUnit) {
        let mut state = self.shared.state.lock().unwrap();
        state.last_unit_id = state.last_unit_id.max(unit.id.as_i64());
        state.units.insert(unit.id, unit);
    }

    /// Committed state of a unit.
    #[must_use]
    pub fn unit(&self, unit_id: UnitId) -> Option<InventoryUnit> {
        self.shared.state.lock().unwrap().units.get(&unit_id).cloned()
    }

    /// Every committed reservation, in insertion order.
    #[must_use]
    pub fn reservations(&self) -> Vec<ReservationRecord> {
        self.shared.state.lock().unwrap().reservations.clone()
    }
}

/// Staged writes of one in-memory transaction.
struct InMemoryTransaction {
    shared: Arc<Shared>,
    commit_delay: Duration,
    /// Staged unit plus the committed version it must still match.
    staged_units: BTreeMap<UnitId, (i64, InventoryUnit)>,
    staged_reservations: Vec<ReservationRecord>,
}

impl InventoryTransaction for InMemoryTransaction {
    fn load_unit(&mut self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>> {
        Box::pin(async move {
            if let Some((_, staged)) = self.staged_units.get(&unit_id) {
                return Ok(Some(staged.clone()));
            }
            Ok(self.shared.state.lock().unwrap().units.get(&unit_id).cloned())
        })
    }

    fn save_unit<'a>(&'a mut self, unit: &'a InventoryUnit) -> StoreFuture<'a, InventoryUnit> {
        Box::pin(async move {
            let (expected, current) = match self.staged_units.get(&unit.id) {
                Some((expected, staged)) => (*expected, staged.version),
                None => {
                    let state = self.shared.state.lock().unwrap();
                    let stored = state
                        .units
                        .get(&unit.id)
                        .ok_or(StoreError::Conflict { unit_id: unit.id })?;
                    (stored.version, stored.version)
                }
            };

            if current != unit.version {
                return Err(StoreError::Conflict { unit_id: unit.id });
            }

            let mut saved = unit.clone();
            saved.version += 1;
            self.staged_units.insert(unit.id, (expected, saved.clone()));
            Ok(saved)
        })
    }

    fn insert_reservation<'a>(&'a mut self, record: &'a ReservationRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.staged_reservations.push(record.clone());
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            if !self.commit_delay.is_zero() {
                tokio::time::sleep(self.commit_delay).await;
            }
            if self.shared.fail_commits.load(Ordering::SeqCst) {
                return Err(StoreError::DatabaseError("injected commit failure".into()));
            }

            let shared = Arc::clone(&self.shared);
            let mut state = shared.state.lock().unwrap();
            for (unit_id, (expected, _)) in &self.staged_units {
                let stored = state.units.get(unit_id).map(|unit| unit.version);
                if stored != Some(*expected) {
                    tracing::debug!(unit_id = %unit_id, ?stored, expected, "Commit conflict");
                    return Err(StoreError::Conflict { unit_id: *unit_id });
                }
            }

            let Self {
                staged_units,
                staged_reservations,
                ..
            } = *self;
            for (unit_id, (_, unit)) in staged_units {
                state.units.insert(unit_id, unit);
            }
            state.reservations.extend(staged_reservations);
            Ok(())
        })
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn InventoryTransaction>> {
        Box::pin(async move {
            let tx: Box<dyn InventoryTransaction> = Box::new(InMemoryTransaction {
                shared: Arc::clone(&self.shared),
                commit_delay: self.commit_delay,
                staged_units: BTreeMap::new(),
                staged_reservations: Vec::new(),
            });
            Ok(tx)
        })
    }

    fn find_unit(&self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>> {
        Box::pin(async move { Ok(self.unit(unit_id)) })
    }

    fn reservations_for_requester<'a>(
        &'a self,
        requester_id: &'a RequesterId,
    ) -> StoreFuture<'a, Vec<ReservationRecord>> {
        Box::pin(async move {
            let mut records: Vec<_> = self
                .reservations()
                .into_iter()
                .filter(|record| &record.requester_id == requester_id)
                .collect();
            records.sort_by_key(|record| (record.created_at, record.id));
            Ok(records)
        })
    }

    fn count_reservations_for_unit(&self, unit_id: UnitId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let state = self.shared.state.lock().unwrap();
            Ok(state
                .reservations
                .iter()
                .filter(|record| record.unit_id == unit_id)
                .count() as u64)
        })
    }
}

impl InventoryAdmin for InMemoryInventoryStore {
    fn create_performance<'a>(&'a self, new: &'a NewPerformance) -> StoreFuture<'a, Performance> {
        Box::pin(async move {
            let mut state = self.shared.state.lock().unwrap();
            state.last_performance_id += 1;
            let performance = Performance {
                id: PerformanceId::new(state.last_performance_id),
                title: new.title.clone(),
                description: new.description.clone(),
                start_at: new.start_at,
            };
            state.performances.insert(performance.id, performance.clone());
            Ok(performance)
        })
    }

    fn find_performance(&self, id: PerformanceId) -> StoreFuture<'_, Option<Performance>> {
        Box::pin(async move { Ok(self.shared.state.lock().unwrap().performances.get(&id).cloned()) })
    }

    fn create_units(&self, units: Vec<NewInventoryUnit>) -> StoreFuture<'_, Vec<InventoryUnit>> {
        Box::pin(async move {
            let mut state = self.shared.state.lock().unwrap();
            if let Some(missing) = units
                .iter()
                .filter_map(|unit| unit.performance_id)
                .find(|id| !state.performances.contains_key(id))
            {
                return Err(StoreError::PerformanceNotFound(missing));
            }

            let mut created = Vec::with_capacity(units.len());
            for new in units {
                state.last_unit_id += 1;
                let unit = InventoryUnit {
                    id: UnitId::new(state.last_unit_id),
                    performance_id: new.performance_id,
                    title: new.title,
                    kind: new.kind,
                    version: 0,
                };
                state.units.insert(unit.id, unit.clone());
                created.push(unit);
            }
            Ok(created)
        })
    }

    fn units_for_performance(&self, id: PerformanceId) -> StoreFuture<'_, Vec<InventoryUnit>> {
        Box::pin(async move {
            let state = self.shared.state.lock().unwrap();
            Ok(state
                .units
                .values()
                .filter(|unit| unit.performance_id == Some(id))
                .cloned()
                .collect())
        })
    }
}
