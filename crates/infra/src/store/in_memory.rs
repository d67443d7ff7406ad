use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use orderlink_core::{DomainError, Entity, OrderId, ProductId};
use orderlink_orders::{Association, AssociationKey, Order, OrderDraft};
use orderlink_products::{Product, ProductDraft};

use super::query::{OrderFilter, ProductFilter};
use super::r#trait::{EntityStore, StockChange, StoreError, StoreResult, StoreTransaction};

#[derive(Debug, Clone)]
struct StoredLink {
    seq: u64,
    association: Association,
}

#[derive(Debug, Clone, Default)]
struct State {
    last_order_id: u64,
    last_product_id: u64,
    last_link_seq: u64,
    orders: BTreeMap<OrderId, Order>,
    products: BTreeMap<ProductId, Product>,
    links: BTreeMap<AssociationKey, StoredLink>,
}

impl State {
    fn links_where(&self, keep: impl Fn(&AssociationKey) -> bool) -> Vec<Association> {
        let mut links: Vec<&StoredLink> = self
            .links
            .iter()
            .filter(|(key, _)| keep(key))
            .map(|(_, link)| link)
            .collect();
        links.sort_by_key(|link| link.seq);
        links.into_iter().map(|link| link.association.clone()).collect()
    }
}

#[derive(Debug, Default)]
struct Inner {
    committed: RwLock<Arc<State>>,
    writer: Arc<Mutex<()>>,
}

/// In-memory transactional entity store.
///
/// Intended for tests/dev. Not optimized for performance.
///
/// Committed state is an immutable snapshot. Read-write transactions queue on a
/// single writer gate, mutate a copy-on-write snapshot and swap it in on commit,
/// which serialises every stock check-and-write. Read-only transactions just
/// clone the current snapshot pointer and never wait for the gate.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntityStore {
    inner: Arc<Inner>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> StoreResult<Arc<State>> {
        let committed = self
            .inner
            .committed
            .read()
            .map_err(|_| StoreError::Poisoned("snapshot"))?;
        Ok(Arc::clone(&committed))
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        // Take the gate before the snapshot so the snapshot includes every
        // commit made by earlier writers.
        let guard = Arc::clone(&self.inner.writer).lock_owned().await;
        let state = self.snapshot()?;
        Ok(Box::new(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            state,
            guard: Some(guard),
        }))
    }

    async fn begin_read_only(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            inner: Arc::clone(&self.inner),
            state: self.snapshot()?,
            guard: None,
        }))
    }
}

struct InMemoryTransaction {
    inner: Arc<Inner>,
    state: Arc<State>,
    /// Writer gate; `None` for read-only transactions.
    guard: Option<OwnedMutexGuard<()>>,
}

impl InMemoryTransaction {
    fn state_mut(&mut self, operation: &'static str) -> StoreResult<&mut State> {
        if self.guard.is_none() {
            return Err(StoreError::ReadOnly(operation));
        }
        Ok(Arc::make_mut(&mut self.state))
    }
}

#[async_trait::async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.state.orders.get(&id).cloned())
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        if self.guard.is_none() {
            return Err(StoreError::ReadOnly("lock_order"));
        }
        Ok(self.state.orders.get(&id).cloned())
    }

    async fn insert_order(&mut self, draft: OrderDraft, at: DateTime<Utc>) -> StoreResult<Order> {
        let state = self.state_mut("insert_order")?;
        state.last_order_id += 1;
        let order = Order::create(OrderId::new(state.last_order_id), draft, at);
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn put_order(&mut self, order: &Order) -> StoreResult<()> {
        let state = self.state_mut("put_order")?;
        match state.orders.get_mut(&order.id) {
            Some(slot) => {
                *slot = order.clone();
                Ok(())
            }
            None => Err(StoreError::backend(
                "put_order",
                format!("order {} does not exist", order.id),
            )),
        }
    }

    async fn scan_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        type Query<'a> = Box<dyn Iterator<Item = &'a Order> + 'a>;

        let links = &self.state.links;
        let mut query: Query<'_> = Box::new(
            self.state
                .orders
                .values()
                .filter(|order| !order.is_tombstoned()),
        );
        for predicate in filter.predicates() {
            query = Box::new(query.filter(move |order| {
                predicate.matches(order, |key| links.contains_key(&key))
            }));
        }
        Ok(query.cloned().collect())
    }

    async fn get_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.state.products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        // The writer gate already excludes every other writer.
        if self.guard.is_none() {
            return Err(StoreError::ReadOnly("lock_product"));
        }
        Ok(self.state.products.get(&id).cloned())
    }

    async fn insert_product(
        &mut self,
        draft: ProductDraft,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        let state = self.state_mut("insert_product")?;
        state.last_product_id += 1;
        let product = Product::create(ProductId::new(state.last_product_id), draft, at);
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn put_product(&mut self, product: &Product) -> StoreResult<()> {
        let state = self.state_mut("put_product")?;
        match state.products.get_mut(&product.id) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(StoreError::backend(
                "put_product",
                format!("product {} does not exist", product.id),
            )),
        }
    }

    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<StockChange> {
        let state = self.state_mut("adjust_stock")?;
        let Some(product) = state.products.get_mut(&id).filter(|p| !p.is_tombstoned()) else {
            return Ok(StockChange::Missing);
        };
        match product.adjust_stock(delta, at) {
            Ok(()) => Ok(StockChange::Applied(product.clone())),
            Err(DomainError::Conflict(_)) => Ok(StockChange::Insufficient {
                available: product.stock,
            }),
            Err(e) => Err(StoreError::backend("adjust_stock", e.to_string())),
        }
    }

    async fn scan_products(&mut self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        type Query<'a> = Box<dyn Iterator<Item = &'a Product> + 'a>;

        let mut query: Query<'_> = Box::new(
            self.state
                .products
                .values()
                .filter(|product| !product.is_tombstoned()),
        );
        for predicate in filter.predicates() {
            query = Box::new(query.filter(move |product| predicate.matches(product)));
        }
        Ok(query.cloned().collect())
    }

    async fn get_association(&mut self, key: AssociationKey) -> StoreResult<Option<Association>> {
        Ok(self
            .state
            .links
            .get(&key)
            .map(|link| link.association.clone()))
    }

    async fn insert_association(&mut self, association: &Association) -> StoreResult<bool> {
        let state = self.state_mut("insert_association")?;
        let key = association.key();
        if state.links.contains_key(&key) {
            return Ok(false);
        }
        state.last_link_seq += 1;
        let seq = state.last_link_seq;
        state.links.insert(
            key,
            StoredLink {
                seq,
                association: association.clone(),
            },
        );
        Ok(true)
    }

    async fn delete_association(&mut self, key: AssociationKey) -> StoreResult<bool> {
        let state = self.state_mut("delete_association")?;
        Ok(state.links.remove(&key).is_some())
    }

    async fn associations_for_order(&mut self, id: OrderId) -> StoreResult<Vec<Association>> {
        Ok(self.state.links_where(|key| key.order_id == id))
    }

    async fn associations_for_product(
        &mut self,
        id: ProductId,
    ) -> StoreResult<Vec<Association>> {
        Ok(self.state.links_where(|key| key.product_id == id))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTransaction {
            inner,
            state,
            guard,
        } = *self;
        if guard.is_some() {
            let mut committed = inner
                .committed
                .write()
                .map_err(|_| StoreError::Poisoned("commit"))?;
            *committed = state;
        }
        // The gate is released only after the new snapshot is visible.
        drop(guard);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn widget(stock: i64) -> ProductDraft {
        ProductDraft::new("Widget", "", dec!(5.00), stock).unwrap()
    }

    #[tokio::test]
    async fn ids_are_assigned_sequentially_per_kind() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().await.unwrap();
        let p1 = tx.insert_product(widget(1), Utc::now()).await.unwrap();
        let p2 = tx.insert_product(widget(1), Utc::now()).await.unwrap();
        let o1 = tx
            .insert_order(OrderDraft::new("first").unwrap(), Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(p1.id, ProductId::new(1));
        assert_eq!(p2.id, ProductId::new(2));
        assert_eq!(o1.id, OrderId::new(1));
    }

    #[tokio::test]
    async fn rollback_discards_writes() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().await.unwrap();
        let p = tx.insert_product(widget(10), Utc::now()).await.unwrap();
        tx.rollback().await.unwrap();

        let mut read = store.begin_read_only().await.unwrap();
        assert!(read.get_product(p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dropped_transaction_behaves_like_rollback() {
        let store = InMemoryEntityStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_product(widget(10), Utc::now()).await.unwrap();
        }
        let mut read = store.begin_read_only().await.unwrap();
        assert!(
            read.scan_products(&ProductFilter::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn read_only_transaction_rejects_writes() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin_read_only().await.unwrap();
        let err = tx.insert_product(widget(1), Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly("insert_product")));
        let err = tx.lock_order(OrderId::new(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly("lock_order")));
    }

    #[tokio::test]
    async fn read_only_transaction_sees_a_stable_snapshot() {
        let store = InMemoryEntityStore::new();
        let mut read = store.begin_read_only().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(widget(1), Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert!(read.get_product(ProductId::new(1)).await.unwrap().is_none());
        let mut fresh = store.begin_read_only().await.unwrap();
        assert!(fresh.get_product(ProductId::new(1)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn adjust_stock_is_conditional() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().await.unwrap();
        let p = tx.insert_product(widget(10), Utc::now()).await.unwrap();

        match tx.adjust_stock(p.id, -6, Utc::now()).await.unwrap() {
            StockChange::Applied(updated) => assert_eq!(updated.stock, 4),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            tx.adjust_stock(p.id, -6, Utc::now()).await.unwrap(),
            StockChange::Insufficient { available: 4 }
        );
        assert_eq!(
            tx.adjust_stock(ProductId::new(99), -1, Utc::now()).await.unwrap(),
            StockChange::Missing
        );
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn association_lists_keep_insertion_order() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().await.unwrap();
        let order = tx
            .insert_order(OrderDraft::new("first").unwrap(), Utc::now())
            .await
            .unwrap();
        let p1 = tx.insert_product(widget(5), Utc::now()).await.unwrap();
        let p2 = tx.insert_product(widget(5), Utc::now()).await.unwrap();
        let qty = orderlink_orders::Quantity::new(1).unwrap();

        // Link the higher id first.
        assert!(
            tx.insert_association(&Association::link(&order, &p2, qty, Utc::now()))
                .await
                .unwrap()
        );
        assert!(
            tx.insert_association(&Association::link(&order, &p1, qty, Utc::now()))
                .await
                .unwrap()
        );
        assert!(
            !tx.insert_association(&Association::link(&order, &p1, qty, Utc::now()))
                .await
                .unwrap()
        );

        let links = tx.associations_for_order(order.id).await.unwrap();
        let ids: Vec<_> = links.iter().map(|l| l.product_id).collect();
        assert_eq!(ids, vec![p2.id, p1.id]);
    }
}
