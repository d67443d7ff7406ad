use std::sync::Arc;

use chrono::Utc;
use tracing::{Span, debug, instrument};

use orderlink_core::{DomainError, ProductId};
use orderlink_products::{Product, ProductDraft};

use super::{finish, live_product, locked_product, product_not_found};
use crate::error::{CommerceError, CommerceResult};
use crate::store::{EntityStore, StockChange};

/// Owns product records and their stock counters.
pub struct ProductLedger<S: ?Sized = dyn EntityStore> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ProductLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ProductLedger<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, draft), fields(product_id))]
    pub async fn create(&self, draft: ProductDraft) -> CommerceResult<Product> {
        let mut tx = self.store.begin().await?;
        let outcome = tx
            .insert_product(draft, Utc::now())
            .await
            .map_err(CommerceError::from);
        let product = finish(tx, outcome).await?;

        Span::current().record("product_id", product.id.get());
        debug!(stock = product.stock, price = %product.price, "product created");
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn get(&self, id: ProductId) -> CommerceResult<Product> {
        let mut tx = self.store.begin_read_only().await?;
        let outcome = live_product(tx.as_mut(), id).await;
        finish(tx, outcome).await
    }

    /// Full replace of the mutable fields of a live product.
    #[instrument(skip(self, draft), fields(product_id = %id))]
    pub async fn update(&self, id: ProductId, draft: ProductDraft) -> CommerceResult<Product> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut product = locked_product(tx.as_mut(), id).await?;
            product.apply_draft(draft, Utc::now());
            tx.put_product(&product).await?;
            Ok::<_, CommerceError>(product)
        }
        .await;
        let product = finish(tx, outcome).await?;

        debug!(stock = product.stock, "product updated");
        Ok(product)
    }

    /// Apply `stock += delta` atomically.
    ///
    /// Refuses (never clamps) a change that would make stock negative.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn adjust_stock(&self, id: ProductId, delta: i64) -> CommerceResult<Product> {
        if delta == 0 {
            return Err(CommerceError::validation("stock delta cannot be zero"));
        }

        let mut tx = self.store.begin().await?;
        let outcome = async {
            // Overflow and shortfall are decided here, under the row lock.
            locked_product(tx.as_mut(), id).await?.stock_after(delta)?;
            match tx.adjust_stock(id, delta, Utc::now()).await? {
                StockChange::Applied(product) => Ok::<_, CommerceError>(product),
                StockChange::Insufficient { available } => Err(CommerceError::from(
                    DomainError::insufficient_stock(available, delta.saturating_neg()),
                )),
                StockChange::Missing => Err(product_not_found(id)),
            }
        }
        .await;
        let product = finish(tx, outcome).await?;

        debug!(delta, stock = product.stock, "stock adjusted");
        Ok(product)
    }

    /// Tombstone a live product. Its associations are left in place.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> CommerceResult<()> {
        let mut tx = self.store.begin().await?;
        let outcome = async {
            let mut product = locked_product(tx.as_mut(), id).await?;
            product.tombstone(Utc::now());
            tx.put_product(&product).await?;
            Ok::<_, CommerceError>(())
        }
        .await;
        finish(tx, outcome).await?;

        debug!("product deleted");
        Ok(())
    }
}
