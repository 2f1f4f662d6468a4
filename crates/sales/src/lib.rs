//! Orders domain module.
//!
//! This crate contains the order lifecycle rules, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{ORDER_TRANSITIONS, Order, OrderStatus, StatusChange, allowed_transitions};
