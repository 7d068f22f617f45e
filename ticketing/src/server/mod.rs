//! HTTP server module for the ticketing system.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health and readiness endpoints
//! - Domain error to HTTP response mapping
//! - Router configuration

pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use health::health_check;
pub use routes::build_router;
pub use state::{AppState, ReadinessProbe};
