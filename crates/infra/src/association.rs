//! Association manager: links products to orders under the stock invariant.
//!
//! Linking is the only operation that consumes stock. Within one read-write
//! transaction it resolves the order, locks the product, refuses duplicate
//! links, applies the conditional stock decrement and inserts the link with
//! the product price read under the lock. Any failure rolls the whole
//! transaction back.
//!
//! Unlinking removes the link only; stock is not restored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use orderlink_core::{DomainError, OrderId, ProductId};
use orderlink_orders::{Association, AssociationKey, Order, OrderLine, ProductOrderLine, Quantity};
use orderlink_products::Product;

use crate::error::{CommerceError, CommerceResult};
use crate::ledger::{
    finish, live_order, live_product, locked_order, locked_product, product_not_found,
};
use crate::store::{EntityStore, StockChange, StoreError, StoreTransaction};

pub struct AssociationManager<S: ?Sized = dyn EntityStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for AssociationManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> AssociationManager<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Link `quantity` units of a product to an order, consuming stock.
    ///
    /// Fails with `Validation` for a non-positive quantity, `NotFound` if either
    /// side is absent or tombstoned, and `Conflict` if the pair is already
    /// linked or stock is insufficient. Concurrent calls against the same
    /// product are serialised by the store's product guard.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id))]
    pub async fn add_product_to_order(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> CommerceResult<Association> {
        let quantity = Quantity::new(quantity)?;

        let mut tx = self.store.begin().await?;
        let outcome = link(tx.as_mut(), order_id, product_id, quantity, Utc::now()).await;
        let association = finish(tx, outcome).await?;

        debug!(
            quantity = association.quantity.get(),
            unit_price = %association.unit_price,
            "product linked to order"
        );
        Ok(association)
    }

    /// Remove a link. Stock is not restored.
    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id))]
    pub async fn remove_product_from_order(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> CommerceResult<()> {
        let key = AssociationKey::new(order_id, product_id);

        let mut tx = self.store.begin().await?;
        let outcome = match tx.delete_association(key).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(association_not_found(key)),
            Err(e) => Err(e.into()),
        };
        finish(tx, outcome).await?;

        debug!("product unlinked from order");
        Ok(())
    }

    /// Products linked to a live order, by identifier ascending.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn products_for_order(&self, order_id: OrderId) -> CommerceResult<Vec<Product>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = async {
            live_order(tx.as_mut(), order_id).await?;
            let mut products: Vec<Product> = order_lines(tx.as_mut(), order_id)
                .await?
                .into_iter()
                .map(|line| line.product)
                .collect();
            products.sort_by_key(|p| p.id);
            Ok::<_, CommerceError>(products)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Orders a live product is linked to, by identifier ascending.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn orders_for_product(&self, product_id: ProductId) -> CommerceResult<Vec<Order>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = async {
            live_product(tx.as_mut(), product_id).await?;
            let mut orders: Vec<Order> = product_order_lines(tx.as_mut(), product_id)
                .await?
                .into_iter()
                .map(|line| line.order)
                .collect();
            orders.sort_by_key(|o| o.id);
            Ok::<_, CommerceError>(orders)
        }
        .await;
        finish(tx, outcome).await
    }

    /// Product lines of a live order with quantity and snapshotted price, in
    /// the order they were linked.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn lines_for_order(&self, order_id: OrderId) -> CommerceResult<Vec<OrderLine>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = async {
            live_order(tx.as_mut(), order_id).await?;
            order_lines(tx.as_mut(), order_id).await
        }
        .await;
        finish(tx, outcome).await
    }

    #[instrument(skip(self), fields(order_id = %order_id, product_id = %product_id))]
    pub async fn association(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> CommerceResult<Association> {
        let key = AssociationKey::new(order_id, product_id);

        let mut tx = self.store.begin_read_only().await?;
        let outcome = match tx.get_association(key).await {
            Ok(Some(association)) => Ok(association),
            Ok(None) => Err(association_not_found(key)),
            Err(e) => Err(e.into()),
        };
        finish(tx, outcome).await
    }
}

async fn link(
    tx: &mut dyn StoreTransaction,
    order_id: OrderId,
    product_id: ProductId,
    quantity: Quantity,
    at: DateTime<Utc>,
) -> CommerceResult<Association> {
    // Both sides are resolved before any stock mutation. Order before product.
    let order = locked_order(tx, order_id).await?;
    let product = locked_product(tx, product_id).await?;

    let key = AssociationKey::new(order_id, product_id);
    if tx.get_association(key).await?.is_some() {
        return Err(already_linked(key));
    }

    match tx.adjust_stock(product_id, quantity.as_decrement(), at).await? {
        StockChange::Applied(_) => {}
        StockChange::Insufficient { available } => {
            return Err(
                DomainError::insufficient_stock(available, i64::from(quantity.get())).into(),
            );
        }
        StockChange::Missing => return Err(product_not_found(product_id)),
    }

    let association = Association::link(&order, &product, quantity, at);
    if !tx.insert_association(&association).await? {
        return Err(already_linked(key));
    }
    Ok(association)
}

/// Lines of an order in link order; tombstoned products are included.
pub(crate) async fn order_lines(
    tx: &mut dyn StoreTransaction,
    order_id: OrderId,
) -> CommerceResult<Vec<OrderLine>> {
    let links = tx.associations_for_order(order_id).await?;
    let mut lines = Vec::with_capacity(links.len());
    for association in links {
        let product = tx
            .get_product(association.product_id)
            .await?
            .ok_or_else(|| dangling(association.key()))?;
        lines.push(OrderLine::new(&association, product));
    }
    Ok(lines)
}

/// Orders containing a product in link order; tombstoned orders are included.
pub(crate) async fn product_order_lines(
    tx: &mut dyn StoreTransaction,
    product_id: ProductId,
) -> CommerceResult<Vec<ProductOrderLine>> {
    let links = tx.associations_for_product(product_id).await?;
    let mut lines = Vec::with_capacity(links.len());
    for association in links {
        let order = tx
            .get_order(association.order_id)
            .await?
            .ok_or_else(|| dangling(association.key()))?;
        lines.push(ProductOrderLine::new(&association, order));
    }
    Ok(lines)
}

fn already_linked(key: AssociationKey) -> CommerceError {
    CommerceError::conflict(format!(
        "product {} already linked to order {}",
        key.product_id, key.order_id
    ))
}

fn association_not_found(key: AssociationKey) -> CommerceError {
    CommerceError::not_found(format!("association {key}"))
}

fn dangling(key: AssociationKey) -> CommerceError {
    StoreError::backend("join", format!("association {key} references a missing record")).into()
}
