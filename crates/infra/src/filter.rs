//! Filter engine: ad-hoc listings over products and orders.
//!
//! Filters are translated into predicate sequences (see [`crate::store::query`])
//! which the store folds over its base query. Listings run in a read-only
//! transaction, so nested lines are consistent with the rows they belong to.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Span, instrument};

use orderlink_orders::{Order, OrderLine, ProductOrderLine};
use orderlink_products::Product;

use crate::association::{order_lines, product_order_lines};
use crate::error::{CommerceError, CommerceResult};
use crate::ledger::finish;
use crate::store::{EntityStore, OrderFilter, ProductFilter};

/// An order in a listing, optionally with its product lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderListing {
    pub order: Order,
    /// Present only when the filter asked for products; link order.
    pub products: Option<Vec<OrderLine>>,
}

/// A product together with the orders that contain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductWithOrders {
    pub product: Product,
    /// Link order; tombstoned orders included.
    pub orders: Vec<ProductOrderLine>,
}

pub struct FilterEngine<S: ?Sized = dyn EntityStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for FilterEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> FilterEngine<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Live products matching every supplied constraint, by identifier
    /// ascending. The empty filter lists every live product.
    #[instrument(skip(self, filter), fields(predicates = filter.predicates().len(), results))]
    pub async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<Vec<Product>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = tx.scan_products(filter).await.map_err(CommerceError::from);
        let products = finish(tx, outcome).await?;

        Span::current().record("results", products.len());
        Ok(products)
    }

    /// Live orders matching every supplied constraint, by identifier ascending.
    #[instrument(
        skip(self, filter),
        fields(
            predicates = filter.predicates().len(),
            include_products = filter.include_products,
            results
        )
    )]
    pub async fn list_orders(&self, filter: &OrderFilter) -> CommerceResult<Vec<OrderListing>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = async {
            let orders = tx.scan_orders(filter).await?;
            let mut listings = Vec::with_capacity(orders.len());
            for order in orders {
                let products = if filter.include_products {
                    Some(order_lines(tx.as_mut(), order.id).await?)
                } else {
                    None
                };
                listings.push(OrderListing { order, products });
            }
            Ok::<_, CommerceError>(listings)
        }
        .await;
        let listings = finish(tx, outcome).await?;

        Span::current().record("results", listings.len());
        Ok(listings)
    }

    /// Products matching `filter`, each with the orders that contain it.
    #[instrument(skip(self, filter), fields(predicates = filter.predicates().len(), results))]
    pub async fn list_products_with_orders(
        &self,
        filter: &ProductFilter,
    ) -> CommerceResult<Vec<ProductWithOrders>> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = async {
            let products = tx.scan_products(filter).await?;
            let mut listings = Vec::with_capacity(products.len());
            for product in products {
                let orders = product_order_lines(tx.as_mut(), product.id).await?;
                listings.push(ProductWithOrders { product, orders });
            }
            Ok::<_, CommerceError>(listings)
        }
        .await;
        let listings = finish(tx, outcome).await?;

        Span::current().record("results", listings.len());
        Ok(listings)
    }
}
