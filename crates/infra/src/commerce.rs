//! `Commerce` facade: the inbound surface over one shared entity store.
//!
//! Every operation takes validated values (drafts, typed identifiers) and
//! returns a [`CommerceError`](crate::CommerceError) on failure. Transport
//! layers (HTTP, CLI) translate their inputs into these calls.

use std::sync::Arc;

use orderlink_core::{OrderId, ProductId};
use orderlink_orders::{Association, Order, OrderDraft, OrderLine};
use orderlink_products::{Product, ProductDraft};

use crate::association::AssociationManager;
use crate::error::CommerceResult;
use crate::filter::{FilterEngine, OrderListing, ProductWithOrders};
use crate::ledger::{OrderLedger, ProductLedger};
use crate::store::{EntityStore, OrderFilter, ProductFilter};

pub struct Commerce<S: ?Sized = dyn EntityStore> {
    products: ProductLedger<S>,
    orders: OrderLedger<S>,
    associations: AssociationManager<S>,
    filters: FilterEngine<S>,
}

impl<S: ?Sized> Clone for Commerce<S> {
    fn clone(&self) -> Self {
        Self {
            products: self.products.clone(),
            orders: self.orders.clone(),
            associations: self.associations.clone(),
            filters: self.filters.clone(),
        }
    }
}

impl<S> Commerce<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            products: ProductLedger::new(Arc::clone(&store)),
            orders: OrderLedger::new(Arc::clone(&store)),
            associations: AssociationManager::new(Arc::clone(&store)),
            filters: FilterEngine::new(store),
        }
    }

    pub fn products(&self) -> &ProductLedger<S> {
        &self.products
    }

    pub fn orders(&self) -> &OrderLedger<S> {
        &self.orders
    }

    pub fn associations(&self) -> &AssociationManager<S> {
        &self.associations
    }

    pub fn filters(&self) -> &FilterEngine<S> {
        &self.filters
    }

    // Orders

    pub async fn create_order(&self, draft: OrderDraft) -> CommerceResult<Order> {
        self.orders.create(draft).await
    }

    pub async fn get_order(&self, id: OrderId) -> CommerceResult<Order> {
        self.orders.get(id).await
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> CommerceResult<Vec<OrderListing>> {
        self.filters.list_orders(filter).await
    }

    pub async fn update_order(&self, id: OrderId, draft: OrderDraft) -> CommerceResult<Order> {
        self.orders.update(id, draft).await
    }

    pub async fn delete_order(&self, id: OrderId) -> CommerceResult<()> {
        self.orders.delete(id).await
    }

    // Products

    pub async fn create_product(&self, draft: ProductDraft) -> CommerceResult<Product> {
        self.products.create(draft).await
    }

    pub async fn get_product(&self, id: ProductId) -> CommerceResult<Product> {
        self.products.get(id).await
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> CommerceResult<Vec<Product>> {
        self.filters.list_products(filter).await
    }

    pub async fn list_products_with_orders(
        &self,
        filter: &ProductFilter,
    ) -> CommerceResult<Vec<ProductWithOrders>> {
        self.filters.list_products_with_orders(filter).await
    }

    pub async fn update_product(
        &self,
        id: ProductId,
        draft: ProductDraft,
    ) -> CommerceResult<Product> {
        self.products.update(id, draft).await
    }

    pub async fn delete_product(&self, id: ProductId) -> CommerceResult<()> {
        self.products.delete(id).await
    }

    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> CommerceResult<Product> {
        self.products.adjust_stock(id, delta).await
    }

    // Associations

    pub async fn add_product_to_order(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i64,
    ) -> CommerceResult<Association> {
        self.associations
            .add_product_to_order(order_id, product_id, quantity)
            .await
    }

    pub async fn remove_product_from_order(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> CommerceResult<()> {
        self.associations
            .remove_product_from_order(order_id, product_id)
            .await
    }

    pub async fn products_for_order(&self, order_id: OrderId) -> CommerceResult<Vec<Product>> {
        self.associations.products_for_order(order_id).await
    }

    pub async fn orders_for_product(&self, product_id: ProductId) -> CommerceResult<Vec<Order>> {
        self.associations.orders_for_product(product_id).await
    }

    pub async fn lines_for_order(&self, order_id: OrderId) -> CommerceResult<Vec<OrderLine>> {
        self.associations.lines_for_order(order_id).await
    }

    pub async fn association(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> CommerceResult<Association> {
        self.associations.association(order_id, product_id).await
    }
}
