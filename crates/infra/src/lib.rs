//! Infrastructure layer: entity store backends, ledgers, association manager,
//! filter engine and the `Commerce` facade that ties them together.

pub mod association;
pub mod commerce;
pub mod config;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod store;

pub use association::AssociationManager;
pub use commerce::Commerce;
pub use error::{CommerceError, CommerceResult};
pub use filter::{FilterEngine, OrderListing, ProductWithOrders};
pub use ledger::{OrderLedger, ProductLedger};
