//! Business metrics for the ticketing service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `ticketing_reservations_total{outcome}` - Reservation attempts by outcome
//! - `ticketing_lock_lease_lost_total` - Critical sections that outlived their lease
//! - `ticketlock_store_conflicts_total` - Version conflicts caught by the store
//!
//! ## Histograms
//! - `ticketing_lock_wait_seconds{strategy}` - Time spent acquiring a unit lock

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;
use ticketlock_core::error::ReservationError;
use ticketlock_core::reservation::ReservationRecord;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register all metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "ticketing_reservations_total",
        "Reservation attempts by outcome (reserved, busy, not_found, out_of_stock, already_reserved, system_fault)"
    );
    describe_histogram!(
        "ticketing_lock_wait_seconds",
        "Time spent acquiring a unit lock, by strategy"
    );
    describe_counter!(
        "ticketing_lock_lease_lost_total",
        "Critical sections whose lock lease was lost before release"
    );
    describe_counter!(
        "ticketlock_store_conflicts_total",
        "Optimistic version conflicts detected by the inventory store"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder and return a handle for rendering `/metrics`.
///
/// # Errors
///
/// Returns [`MetricsError`] if the exporter cannot be built or a recorder is
/// already installed.
pub fn install_prometheus() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("wait_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_business_metrics();
    Ok(handle)
}

/// Metric label for a reservation outcome.
#[must_use]
pub const fn outcome_label(result: &Result<ReservationRecord, ReservationError>) -> &'static str {
    match result {
        Ok(_) => "reserved",
        Err(ReservationError::Busy { .. }) => "busy",
        Err(ReservationError::NotFound { .. }) => "not_found",
        Err(ReservationError::OutOfStock { .. }) => "out_of_stock",
        Err(ReservationError::AlreadyReserved { .. }) => "already_reserved",
        Err(ReservationError::SystemFault(_)) => "system_fault",
    }
}

/// Record the outcome of one reservation attempt.
pub fn record_reservation(result: &Result<ReservationRecord, ReservationError>) {
    let outcome = outcome_label(result);
    metrics::counter!("ticketing_reservations_total", "outcome" => outcome).increment(1);
    tracing::trace!(outcome, "Recorded reservation metric");
}

/// Record how long a lock acquisition took.
pub fn record_lock_wait(strategy: &'static str, waited: Duration) {
    metrics::histogram!("ticketing_lock_wait_seconds", "strategy" => strategy)
        .record(waited.as_secs_f64());
}

/// Record a lease lost while its critical section was still running.
pub fn record_lease_lost() {
    metrics::counter!("ticketing_lock_lease_lost_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ticketlock_core::inventory::UnitId;
    use ticketlock_core::reservation::RequesterId;

    #[test]
    fn outcome_labels_cover_every_result() {
        let unit_id = UnitId::new(1);
        let record = ReservationRecord::new(unit_id, RequesterId::new("u"), "U", Utc::now());

        assert_eq!(outcome_label(&Ok(record)), "reserved");
        assert_eq!(outcome_label(&Err(ReservationError::Busy { unit_id })), "busy");
        assert_eq!(outcome_label(&Err(ReservationError::NotFound { unit_id })), "not_found");
        assert_eq!(outcome_label(&Err(ReservationError::OutOfStock { unit_id })), "out_of_stock");
        assert_eq!(
            outcome_label(&Err(ReservationError::AlreadyReserved { unit_id })),
            "already_reserved"
        );
        assert_eq!(
            outcome_label(&Err(ReservationError::SystemFault("x".into()))),
            "system_fault"
        );
    }

    #[test]
    fn recording_without_a_recorder_is_harmless() {
        record_lock_wait("patient", Duration::from_millis(3));
        record_lease_lost();
        record_reservation(&Err(ReservationError::Busy { unit_id: UnitId::new(2) }));
    }
}
