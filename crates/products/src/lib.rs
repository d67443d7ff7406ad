//! Products domain module.
//!
//! This crate contains business rules for the product catalog and its stock
//! counters, implemented purely as deterministic domain logic (no IO, no storage).

pub mod price;
pub mod product;

pub use orderlink_core::ProductId;
pub use price::Price;
pub use product::{Product, ProductDraft, DESCRIPTION_MAX_CHARS, NAME_MAX_CHARS};
