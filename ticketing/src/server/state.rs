//! Application state for the ticketing HTTP server.
//!
//! Contains all shared resources needed by HTTP handlers:
//! - Reservation coordinator (the locked critical path)
//! - Admin service (performances and inventory)
//! - Readiness probes for the database and the lock store
//! - Prometheus handle for `/metrics`

use crate::admin::AdminService;
use crate::coordinator::ReservationCoordinator;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use ticketlock_postgres::PostgresInventoryStore;
use ticketlock_redis::RedisLock;

/// Boxed future returned by [`ReadinessProbe::check`].
pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), String>> + Send + 'a>>;

/// A dependency the service needs before it can take traffic.
pub trait ReadinessProbe: Send + Sync {
    /// Name reported in the readiness response.
    fn name(&self) -> &'static str;

    /// Check the dependency, returning a description of the failure if any.
    fn check(&self) -> ProbeFuture<'_>;
}

impl ReadinessProbe for PostgresInventoryStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move { self.ping().await.map_err(|e| e.to_string()) })
    }
}

impl ReadinessProbe for RedisLock {
    fn name(&self) -> &'static str {
        "lock_store"
    }

    fn check(&self) -> ProbeFuture<'_> {
        Box::pin(async move { self.ping().await.map_err(|e| e.to_string()) })
    }
}

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Reservation coordinator
    pub coordinator: Arc<ReservationCoordinator>,

    /// Performance and inventory administration
    pub admin: Arc<AdminService>,

    /// Dependencies checked by `/ready`
    pub probes: Vec<Arc<dyn ReadinessProbe>>,

    /// Prometheus exporter, when installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state with no probes and no exporter.
    #[must_use]
    pub fn new(coordinator: ReservationCoordinator, admin: AdminService) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            admin: Arc::new(admin),
            probes: Vec::new(),
            metrics: None,
        }
    }

    /// Add a readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// Serve `/metrics` from this Prometheus handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
