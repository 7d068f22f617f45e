//! API endpoints for the ticketing system.
//!
//! - Reservations: reserve a ticket, list a requester's reservations, show a ticket
//! - Admin: create performances and their inventory

pub mod admin;
pub mod reservations;

pub use admin::{create_performance, init_tickets, list_units};
pub use reservations::{get_ticket, list_my_reservations, reserve_ticket};
