//! Orders domain module.
//!
//! This crate contains business rules for orders and for the order↔product
//! association entity, implemented purely as deterministic domain logic
//! (no IO, no storage).

pub mod association;
pub mod order;

pub use association::{Association, AssociationKey, OrderLine, ProductOrderLine, Quantity};
pub use order::{DESCRIPTION_MAX_CHARS, DESCRIPTION_MIN_CHARS, Order, OrderDraft};
pub use orderlink_core::OrderId;
