//! Product and order ledgers.
//!
//! A ledger owns one record kind. Every operation runs in its own store
//! transaction: it commits on success and is rolled back on any error, so a
//! failed call leaves no partial state behind.

pub mod orders;
pub mod products;

pub use orders::OrderLedger;
pub use products::ProductLedger;

use orderlink_core::{Entity, OrderId, ProductId};
use orderlink_orders::Order;
use orderlink_products::Product;

use crate::error::{CommerceError, CommerceResult};
use crate::store::StoreTransaction;

/// Commit on `Ok`, roll back on `Err`.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTransaction>,
    outcome: CommerceResult<T>,
) -> CommerceResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            tx.rollback().await?;
            Err(err)
        }
    }
}

pub(crate) fn order_not_found(id: OrderId) -> CommerceError {
    CommerceError::not_found(format!("order {id}"))
}

pub(crate) fn product_not_found(id: ProductId) -> CommerceError {
    CommerceError::not_found(format!("product {id}"))
}

/// Resolve a live order inside `tx`.
pub(crate) async fn live_order(
    tx: &mut dyn StoreTransaction,
    id: OrderId,
) -> CommerceResult<Order> {
    tx.get_order(id)
        .await?
        .and_then(Entity::live)
        .ok_or_else(|| order_not_found(id))
}

/// Resolve a live order and hold its write guard until `tx` ends.
pub(crate) async fn locked_order(
    tx: &mut dyn StoreTransaction,
    id: OrderId,
) -> CommerceResult<Order> {
    tx.lock_order(id)
        .await?
        .and_then(Entity::live)
        .ok_or_else(|| order_not_found(id))
}

/// Resolve a live product inside `tx` without locking it.
pub(crate) async fn live_product(
    tx: &mut dyn StoreTransaction,
    id: ProductId,
) -> CommerceResult<Product> {
    tx.get_product(id)
        .await?
        .and_then(Entity::live)
        .ok_or_else(|| product_not_found(id))
}

/// Resolve a live product and hold its write guard until `tx` ends.
pub(crate) async fn locked_product(
    tx: &mut dyn StoreTransaction,
    id: ProductId,
) -> CommerceResult<Product> {
    tx.lock_product(id)
        .await?
        .and_then(Entity::live)
        .ok_or_else(|| product_not_found(id))
}
