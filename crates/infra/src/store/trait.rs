use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use orderlink_core::{OrderId, ProductId};
use orderlink_orders::{Association, AssociationKey, Order, OrderDraft};
use orderlink_products::{Product, ProductDraft};

use super::query::{OrderFilter, ProductFilter};

/// Entity store operation error.
///
/// These are **infrastructure errors** (backend failures, undecodable rows) as
/// opposed to domain errors (validation, missing records, conflicts). Business
/// outcomes such as "insufficient stock" are returned as values, never as a
/// `StoreError`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("failed to decode {kind} record: {message}")]
    Decode { kind: &'static str, message: String },

    #[error("write attempted in a read-only transaction ({0})")]
    ReadOnly(&'static str),

    #[error("store lock poisoned in {0}")]
    Poisoned(&'static str),
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }

    pub fn decode(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            kind,
            message: message.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of the conditional stock adjustment primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockChange {
    /// The delta was applied; carries the updated product.
    Applied(Product),
    /// Applying the delta would have made stock negative; nothing changed.
    Insufficient { available: i64 },
    /// No live product with that id.
    Missing,
}

/// Transactional entity store.
///
/// The store is the only shared mutable resource. Every unit of work runs in a
/// transaction obtained from [`EntityStore::begin`] (read-write) or
/// [`EntityStore::begin_read_only`]; a transaction either commits as a whole or
/// leaves no trace.
///
/// ## Isolation requirements
///
/// Implementations must:
/// - give consistent reads within a transaction (at least read committed)
/// - serialise concurrent writers on a product's stock: [`StoreTransaction::lock_product`]
///   and [`StoreTransaction::adjust_stock`] must behave as if the caller held the
///   product exclusively until commit/rollback
/// - make a group of writes atomic (all visible after commit, none after rollback)
/// - never block read-only transactions behind writers beyond normal visibility rules
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Start a read-write transaction.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

    /// Start a transaction that rejects writes with [`StoreError::ReadOnly`].
    async fn begin_read_only(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

#[async_trait::async_trait]
impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        (**self).begin().await
    }

    async fn begin_read_only(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        (**self).begin_read_only().await
    }
}

/// Operations available inside a store transaction.
///
/// Point reads return records regardless of tombstones; callers decide whether a
/// tombstoned record counts as absent. Scans return live records only, ordered
/// by identifier ascending. Association lists are in insertion order.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    async fn get_order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Read an order and hold its write guard until the transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Insert a new order; the store assigns the next identifier.
    async fn insert_order(&mut self, draft: OrderDraft, at: DateTime<Utc>) -> StoreResult<Order>;

    /// Overwrite an existing order record.
    async fn put_order(&mut self, order: &Order) -> StoreResult<()>;

    async fn scan_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    async fn get_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Read a product and hold its write guard until the transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    /// Insert a new product; the store assigns the next identifier.
    async fn insert_product(
        &mut self,
        draft: ProductDraft,
        at: DateTime<Utc>,
    ) -> StoreResult<Product>;

    /// Overwrite an existing product record.
    async fn put_product(&mut self, product: &Product) -> StoreResult<()>;

    /// Conditional `stock += delta` on a live product, refused if the result
    /// would be negative. Check and write are one atomic step.
    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<StockChange>;

    async fn scan_products(&mut self, filter: &ProductFilter) -> StoreResult<Vec<Product>>;

    async fn get_association(&mut self, key: AssociationKey) -> StoreResult<Option<Association>>;

    /// Insert a link. Returns `false` (and writes nothing) if the pair is
    /// already linked.
    async fn insert_association(&mut self, association: &Association) -> StoreResult<bool>;

    /// Remove a link. Returns `false` if there was none.
    async fn delete_association(&mut self, key: AssociationKey) -> StoreResult<bool>;

    async fn associations_for_order(&mut self, id: OrderId) -> StoreResult<Vec<Association>>;

    async fn associations_for_product(&mut self, id: ProductId)
    -> StoreResult<Vec<Association>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
