use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, debug, instrument};

use orderlink_core::OrderId;
use orderlink_orders::{Order, OrderDraft};

use super::{finish, live_order, locked_order};
use crate::error::{CommerceError, CommerceResult};
use crate::store::EntityStore;

/// Owns order records.
pub struct OrderLedger<S: ?Sized = dyn EntityStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for OrderLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> OrderLedger<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, draft), fields(order_id))]
    pub async fn create(&self, draft: OrderDraft) -> CommerceResult<Order> {
        let mut tx = self.store.begin().await?;
        let outcome = tx
            .insert_order(draft, Utc::now())
            .await
            .map_err(CommerceError::from);
        let order = finish(tx, outcome).await?;

        Span::current().record("order_id", order.id.get());
        debug!("order created");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get(&self, id: OrderId) -> CommerceResult<Order> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = live_order(tx.as_mut(), id).await;
        finish(tx, outcome).await
    }

    #[instrument(skip(self, draft), fields(order_id = %id))]
    pub async fn update(&self, id: OrderId, draft: OrderDraft) -> CommerceResult<Order> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut order = locked_order(tx.as_mut(), id).await?;
            order.apply_draft(draft, Utc::now());
            tx.put_order(&order).await?;
            Ok::<_, CommerceError>(order)
        }
        .await;
        let order = finish(tx, outcome).await?;

        debug!("order updated");
        Ok(order)
    }

    /// Tombstone a live order. Its associations are left in place.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: OrderId) -> CommerceResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut order = locked_order(tx.as_mut(), id).await?;
            order.tombstone(Utc::now());
            tx.put_order(&order).await?;
            Ok::<_, CommerceError>(())
        }
        .await;
        finish(tx, outcome).await?;

        debug!("order deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEntityStore;

    fn ledger() -> OrderLedger<InMemoryEntityStore> {
        OrderLedger::new(Arc::new(InMemoryEntityStore::new()))
    }

    #[tokio::test]
    async fn identifiers_follow_creation_order() {
        let ledger = ledger();
        let first = ledger.create(OrderDraft::new("first").unwrap()).await.unwrap();
        let second = ledger.create(OrderDraft::new("second").unwrap()).await.unwrap();
        assert!(first.id < second.id);
    }

    #[tokio::test]
    async fn update_then_get() {
        let ledger = ledger();
        let order = ledger.create(OrderDraft::new("first").unwrap()).await.unwrap();
        ledger
            .update(order.id, OrderDraft::new("  renamed  ").unwrap())
            .await
            .unwrap();
        assert_eq!(ledger.get(order.id).await.unwrap().description, "renamed");
    }

    #[tokio::test]
    async fn delete_is_a_tombstone() {
        let ledger = ledger();
        let order = ledger.create(OrderDraft::new("first").unwrap()).await.unwrap();
        ledger.delete(order.id).await.unwrap();

        let err = ledger.get(order.id).await.unwrap_err();
        assert_eq!(err.to_string(), format!("order {} not found", order.id));
        assert!(ledger.delete(order.id).await.unwrap_err().is_not_found());
    }
}
