//! Inventory domain module.
//!
//! This crate contains business rules for stock rows and reservations,
//! implemented purely as deterministic domain logic (no IO, no locking, no
//! storage). Callers provide mutual exclusion per product.

pub mod reservation;
pub mod stock;

pub use reservation::{DEFAULT_RESERVATION_TTL_SECS, Reservation};
pub use stock::{StockAdjustment, StockEntry, StockHold, StockLevels, StockOperation};
