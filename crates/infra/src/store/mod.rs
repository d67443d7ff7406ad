//! Transactional entity store boundary.
//!
//! This module defines the storage abstraction the ledgers, the association
//! manager and the filter engine run on, plus its in-memory and Postgres
//! implementations.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEntityStore;
pub use postgres::PostgresEntityStore;
pub use query::{OrderFilter, OrderPredicate, ProductFilter, ProductPredicate};
pub use r#trait::{EntityStore, StockChange, StoreError, StoreResult, StoreTransaction};
