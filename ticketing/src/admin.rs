//! Administration of performances and inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use ticketlock_core::inventory::{InventoryKind, InventoryUnit, NewInventoryUnit, SeatDescriptor, SeatStatus};
use ticketlock_core::performance::{NewPerformance, Performance, PerformanceId};
use ticketlock_core::store::{InventoryAdmin, StoreError};

/// Largest number of units a single `init_tickets` call may create.
pub const MAX_UNITS_PER_BATCH: u32 = 10_000;

/// Administrative failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Referenced performance does not exist.
    #[error("Performance {0} not found")]
    PerformanceNotFound(PerformanceId),

    /// The request is malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The store failed.
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PerformanceNotFound(id) => Self::PerformanceNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Body of a create-performance request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePerformanceRequest {
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Start time (RFC 3339)
    pub start_at: DateTime<Utc>,
}

/// Creates performances and their inventory.
#[derive(Clone)]
pub struct AdminService {
    admin: Arc<dyn InventoryAdmin>,
}

impl AdminService {
    /// Create the service over an admin store.
    #[must_use]
    pub fn new(admin: Arc<dyn InventoryAdmin>) -> Self {
        Self { admin }
    }

    /// Create a performance.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidRequest`] for a blank title, or
    /// [`AdminError::Store`] if the insert fails.
    pub async fn create_performance(
        &self,
        request: CreatePerformanceRequest,
    ) -> Result<Performance, AdminError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AdminError::InvalidRequest("title must not be blank".into()));
        }

        let performance = self
            .admin
            .create_performance(&NewPerformance {
                title: title.to_string(),
                description: request.description,
                start_at: request.start_at,
            })
            .await?;

        tracing::info!(performance_id = %performance.id, title = %performance.title, "Performance created");
        Ok(performance)
    }

    /// Bulk-create `count` units for a performance.
    ///
    /// Without `quantity` each unit is a seat labelled `Seat-1` .. `Seat-<count>`;
    /// with it each unit is a quantity unit holding `quantity` tickets.
    ///
    /// # Errors
    ///
    /// - [`AdminError::InvalidRequest`]: `count` is 0 or above [`MAX_UNITS_PER_BATCH`]
    /// - [`AdminError::PerformanceNotFound`]: no such performance
    /// - [`AdminError::Store`]: the insert failed (nothing is created)
    pub async fn init_tickets(
        &self,
        performance_id: PerformanceId,
        count: u32,
        quantity: Option<u32>,
    ) -> Result<Vec<InventoryUnit>, AdminError> {
        if count == 0 || count > MAX_UNITS_PER_BATCH {
            return Err(AdminError::InvalidRequest(format!(
                "count must be between 1 and {MAX_UNITS_PER_BATCH}, got {count}"
            )));
        }

        let performance = self
            .admin
            .find_performance(performance_id)
            .await?
            .ok_or(AdminError::PerformanceNotFound(performance_id))?;

        let units = (1..=count)
            .map(|n| NewInventoryUnit {
                performance_id: Some(performance_id),
                title: performance.title.clone(),
                kind: match quantity {
                    Some(available_quantity) => InventoryKind::Quantity { available_quantity },
                    None => InventoryKind::Seat {
                        status: SeatStatus::Available,
                        seat: SeatDescriptor::new(format!("Seat-{n}")),
                    },
                },
            })
            .collect();

        let created = self.admin.create_units(units).await?;
        tracing::info!(
            performance_id = %performance_id,
            count = created.len(),
            quantity = ?quantity,
            "Tickets initialized"
        );
        Ok(created)
    }

    /// Create a single unit.
    ///
    /// # Errors
    ///
    /// - [`AdminError::PerformanceNotFound`]: the unit references a missing performance
    /// - [`AdminError::Store`]: the insert failed
    pub async fn create_unit(&self, unit: NewInventoryUnit) -> Result<InventoryUnit, AdminError> {
        self.admin
            .create_units(vec![unit])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AdminError::Store(StoreError::DatabaseError("no unit returned".into())))
    }

    /// All units of a performance.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Store`] if the query fails.
    pub async fn units_for_performance(
        &self,
        performance_id: PerformanceId,
    ) -> Result<Vec<InventoryUnit>, AdminError> {
        Ok(self.admin.units_for_performance(performance_id).await?)
    }
}

impl std::fmt::Debug for AdminService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminService").finish_non_exhaustive()
    }
}
