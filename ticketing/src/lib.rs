//! Ticket reservation service with per-unit distributed locking.
//!
//! Many stateless instances sell the same finite inventory. Each reservation
//! takes the unit's lock in a shared lock store, then decrements the unit and
//! writes the reservation record in one storage transaction:
//!
//! ```text
//!   HTTP ──► api ──► ReservationCoordinator ──► LockFacade ──► DistributedLock (Redis)
//!                           │
//!                           └──► InventoryStore transaction (PostgreSQL)
//!                                  load ─► consume ─► save ─► insert record ─► commit
//! ```
//!
//! # Guarantees
//!
//! - **No oversell**: a quantity unit never sells more than it started with
//! - **No double booking**: a seat unit is booked at most once
//! - **One record per success**: a failed attempt leaves no partial write
//! - **Lock always released**: every exit path releases the unit's lock
//!
//! # Lock strategies
//!
//! A deployment picks one [`LockStrategy`](lock_facade::LockStrategy):
//!
//! - `BestEffort`: one attempt, fail fast with `Busy`, fixed lease
//! - `Patient`: wait up to a deadline, hold with a watchdog-renewed lease
//!
//! # Usage
//!
//! See [`coordinator`] for the critical path and [`server`] for the HTTP surface.

#![forbid(unsafe_code)]

pub mod admin;
pub mod api;
pub mod config;
pub mod coordinator;
pub mod lock_facade;
pub mod metrics;
pub mod server;

pub use admin::{AdminError, AdminService};
pub use config::Config;
pub use coordinator::ReservationCoordinator;
pub use lock_facade::{LockFacade, LockStrategy};
