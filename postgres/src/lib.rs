//! `PostgreSQL` inventory store for ticket reservation.
//!
//! This crate implements [`InventoryStore`] and [`InventoryAdmin`] from
//! `ticketlock-core` on top of sqlx:
//!
//! - One `sqlx` transaction per [`InventoryTransaction`]; dropping it rolls back
//! - `SELECT ... FOR UPDATE` when a unit is loaded for a reservation
//! - `UPDATE ... WHERE version = $n` as a compare-and-swap on save
//! - Migrations embedded with `sqlx::migrate!`
//!
//! # Example
//!
//! ```no_run
//! use ticketlock_postgres::PostgresInventoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresInventoryStore::new("postgres://localhost/tickets").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeSet;
use std::time::Duration;
use ticketlock_core::inventory::{InventoryUnit, NewInventoryUnit, UnitId};
use ticketlock_core::performance::{NewPerformance, Performance, PerformanceId};
use ticketlock_core::reservation::{RequesterId, ReservationRecord};
use ticketlock_core::store::{
    InventoryAdmin, InventoryStore, InventoryTransaction, StoreError, StoreFuture,
};

mod rows;

use rows::{
    RESERVATION_COLUMNS, UNIT_COLUMNS, kind_columns, performance_from_row, reservation_from_row,
    unit_from_row,
};

/// `PostgreSQL`-backed inventory store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Connect with a pool of up to 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::connect(database_url, 10, Duration::from_secs(5)).await
    }

    /// Connect with explicit pool sizing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the connection fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to PostgreSQL inventory store");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Check that the database answers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if the query fails.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Health check failed: {e}")))?;
        Ok(())
    }
}

/// A reservation unit of work backed by one database transaction.
struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl InventoryTransaction for PostgresTransaction {
    fn load_unit(&mut self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>> {
        Box::pin(async move {
            let query = format!("SELECT {UNIT_COLUMNS} FROM inventory_units WHERE id = $1 FOR UPDATE");
            let row = sqlx::query(&query)
                .bind(unit_id.as_i64())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to load unit: {e}")))?;

            row.as_ref().map(unit_from_row).transpose()
        })
    }

    fn save_unit<'a>(&'a mut self, unit: &'a InventoryUnit) -> StoreFuture<'a, InventoryUnit> {
        Box::pin(async move {
            let (available_quantity, status, seat_label) = kind_columns(&unit.kind)?;

            let new_version: Option<i64> = sqlx::query_scalar(
                r"
                UPDATE inventory_units
                SET available_quantity = $2,
                    status = $3,
                    seat_label = $4,
                    version = version + 1
                WHERE id = $1 AND version = $5
                RETURNING version
                ",
            )
            .bind(unit.id.as_i64())
            .bind(available_quantity)
            .bind(status)
            .bind(seat_label)
            .bind(unit.version)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to save unit: {e}")))?;

            let Some(version) = new_version else {
                metrics::counter!("ticketlock_store_conflicts_total").increment(1);
                tracing::warn!(unit_id = %unit.id, expected_version = unit.version, "Version conflict on save");
                return Err(StoreError::Conflict { unit_id: unit.id });
            };

            let mut saved = unit.clone();
            saved.version = version;
            Ok(saved)
        })
    }

    fn insert_reservation<'a>(&'a mut self, record: &'a ReservationRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO reservations (id, unit_id, requester_id, requester_name, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(*record.id.as_uuid())
            .bind(record.unit_id.as_i64())
            .bind(record.requester_id.as_str())
            .bind(&record.requester_name)
            .bind(record.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to insert reservation: {e}")))?;
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> StoreFuture<'static, ()> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to commit transaction: {e}")))
        })
    }
}

impl InventoryStore for PostgresInventoryStore {
    fn begin(&self) -> StoreFuture<'_, Box<dyn InventoryTransaction>> {
        Box::pin(async move {
            let tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to start transaction: {e}")))?;
            let tx: Box<dyn InventoryTransaction> = Box::new(PostgresTransaction { tx });
            Ok(tx)
        })
    }

    fn find_unit(&self, unit_id: UnitId) -> StoreFuture<'_, Option<InventoryUnit>> {
        Box::pin(async move {
            let query = format!("SELECT {UNIT_COLUMNS} FROM inventory_units WHERE id = $1");
            let row = sqlx::query(&query)
                .bind(unit_id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to find unit: {e}")))?;

            row.as_ref().map(unit_from_row).transpose()
        })
    }

    fn reservations_for_requester<'a>(
        &'a self,
        requester_id: &'a RequesterId,
    ) -> StoreFuture<'a, Vec<ReservationRecord>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE requester_id = $1 ORDER BY created_at, id"
            );
            let rows = sqlx::query(&query)
                .bind(requester_id.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to load reservations: {e}"))
                })?;

            rows.iter().map(reservation_from_row).collect()
        })
    }

    fn count_reservations_for_unit(&self, unit_id: UnitId) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE unit_id = $1")
                .bind(unit_id.as_i64())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    StoreError::DatabaseError(format!("Failed to count reservations: {e}"))
                })?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}

impl InventoryAdmin for PostgresInventoryStore {
    fn create_performance<'a>(&'a self, new: &'a NewPerformance) -> StoreFuture<'a, Performance> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                INSERT INTO performances (title, description, start_at)
                VALUES ($1, $2, $3)
                RETURNING id, title, description, start_at
                ",
            )
            .bind(&new.title)
            .bind(&new.description)
            .bind(new.start_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to create performance: {e}")))?;

            performance_from_row(&row)
        })
    }

    fn find_performance(&self, id: PerformanceId) -> StoreFuture<'_, Option<Performance>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, title, description, start_at FROM performances WHERE id = $1",
            )
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(format!("Failed to find performance: {e}")))?;

            row.as_ref().map(performance_from_row).transpose()
        })
    }

    fn create_units(&self, units: Vec<NewInventoryUnit>) -> StoreFuture<'_, Vec<InventoryUnit>> {
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to start transaction: {e}")))?;

            let performance_ids: BTreeSet<PerformanceId> =
                units.iter().filter_map(|unit| unit.performance_id).collect();
            for performance_id in performance_ids {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM performances WHERE id = $1)")
                        .bind(performance_id.as_i64())
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| {
                            StoreError::DatabaseError(format!("Failed to check performance: {e}"))
                        })?;
                if !exists {
                    return Err(StoreError::PerformanceNotFound(performance_id));
                }
            }

            let query = format!(
                "INSERT INTO inventory_units \
                 (performance_id, title, kind, available_quantity, status, seat_label) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING {UNIT_COLUMNS}"
            );
            let mut created = Vec::with_capacity(units.len());
            for unit in &units {
                let (available_quantity, status, seat_label) = kind_columns(&unit.kind)?;
                let row = sqlx::query(&query)
                    .bind(unit.performance_id.map(|id| id.as_i64()))
                    .bind(&unit.title)
                    .bind(unit.kind.as_str())
                    .bind(available_quantity)
                    .bind(status)
                    .bind(seat_label)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| StoreError::DatabaseError(format!("Failed to create unit: {e}")))?;
                created.push(unit_from_row(&row)?);
            }

            tx.commit()
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to commit transaction: {e}")))?;

            tracing::info!(count = created.len(), "Created inventory units");
            Ok(created)
        })
    }

    fn units_for_performance(&self, id: PerformanceId) -> StoreFuture<'_, Vec<InventoryUnit>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {UNIT_COLUMNS} FROM inventory_units WHERE performance_id = $1 ORDER BY id"
            );
            let rows = sqlx::query(&query)
                .bind(id.as_i64())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::DatabaseError(format!("Failed to load units: {e}")))?;

            rows.iter().map(unit_from_row).collect()
        })
    }
}
