//! Postgres-backed entity store implementation.
//!
//! Each [`StoreTransaction`] wraps one SQLx transaction at `READ COMMITTED`.
//! Stock safety does not depend on the isolation level: the product row is
//! locked with `SELECT … FOR UPDATE` and the stock change is a single
//! conditional `UPDATE` that refuses to go below zero, backed by a `CHECK`
//! constraint in the schema.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Backend` | Duplicate key outside an `ON CONFLICT` clause |
//! | Database (check constraint violation) | `23514` | `Backend` | Row violates a schema invariant |
//! | Database (serialization failure) | `40001` | `Backend` | Concurrent transaction conflict |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | ColumnDecode / Decode | N/A | `Decode` | Row could not be read into a record |
//! | PoolClosed | N/A | `Backend` | Connection pool was closed |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresEntityStore` is `Send + Sync` and can be shared across tasks.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{info, instrument};

use orderlink_core::{OrderId, ProductId};
use orderlink_orders::{Association, AssociationKey, Order, OrderDraft, Quantity};
use orderlink_products::{Price, Product, ProductDraft};

use super::query::{OrderFilter, OrderPredicate, ProductFilter, ProductPredicate};
use super::r#trait::{EntityStore, StockChange, StoreError, StoreResult, StoreTransaction};

const ORDER_COLUMNS: &str = "id, description, created_at, updated_at, deleted_at";
const PRODUCT_COLUMNS: &str =
    "id, name, description, price, stock, created_at, updated_at, deleted_at";
const LINK_COLUMNS: &str = "order_id, product_id, quantity, unit_price, linked_at";

/// Postgres-backed transactional entity store.
#[derive(Debug, Clone)]
pub struct PostgresEntityStore {
    pool: Arc<PgPool>,
}

impl PostgresEntityStore {
    /// Create a new store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::backend("migrate", e.to_string()))?;
        info!("schema migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn open(&self, read_only: bool) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        if read_only {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        }
        Ok(Box::new(PostgresTransaction { tx, read_only }))
    }
}

#[async_trait::async_trait]
impl EntityStore for PostgresEntityStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.open(false).await
    }

    async fn begin_read_only(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        self.open(true).await
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    read_only: bool,
}

impl PostgresTransaction {
    fn ensure_writable(&self, operation: &'static str) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::ReadOnly(operation));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn get_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(db_id("get_order", id.get())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        row.map(Order::try_from).transpose()
    }

    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        self.ensure_writable("lock_order")?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(db_id("lock_order", id.get())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_order", e))?;
        row.map(Order::try_from).transpose()
    }

    async fn insert_order(&mut self, draft: OrderDraft, at: DateTime<Utc>) -> StoreResult<Order> {
        self.ensure_writable("insert_order")?;
        let sql = format!(
            "INSERT INTO orders (description, created_at, updated_at) \
             VALUES ($1, $2, $2) RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(draft.description())
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        Order::try_from(row)
    }

    async fn put_order(&mut self, order: &Order) -> StoreResult<()> {
        self.ensure_writable("put_order")?;
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET description = $2, updated_at = $3, deleted_at = $4
            WHERE id = $1
            "#,
        )
        .bind(db_id("put_order", order.id.get())?)
        .bind(&order.description)
        .bind(order.updated_at)
        .bind(order.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("put_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::backend(
                "put_order",
                format!("order {} does not exist", order.id),
            ));
        }
        Ok(())
    }

    async fn scan_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE deleted_at IS NULL"
        ));
        for predicate in filter.predicates() {
            match predicate {
                OrderPredicate::DescriptionContains(needle) => {
                    query
                        .push(" AND strpos(description, ")
                        .push_bind(needle)
                        .push(") > 0");
                }
                OrderPredicate::ContainsProduct(product_id) => {
                    query
                        .push(
                            " AND EXISTS (SELECT 1 FROM order_products op \
                             WHERE op.order_id = orders.id AND op.product_id = ",
                        )
                        .push_bind(db_id("scan_orders", product_id.get())?)
                        .push(")");
                }
            }
        }
        query.push(" ORDER BY id ASC");

        let rows = query
            .build_query_as::<OrderRow>()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("scan_orders", e))?;
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn get_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(db_id("get_product", id.get())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;
        row.map(Product::try_from).transpose()
    }

    async fn lock_product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        self.ensure_writable("lock_product")?;
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(db_id("lock_product", id.get())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_product", e))?;
        row.map(Product::try_from).transpose()
    }

    async fn insert_product(
        &mut self,
        draft: ProductDraft,
        at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.ensure_writable("insert_product")?;
        let sql = format!(
            "INSERT INTO products (name, description, price, stock, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(draft.name())
            .bind(draft.description())
            .bind(draft.price().amount())
            .bind(draft.stock())
            .bind(at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        Product::try_from(row)
    }

    async fn put_product(&mut self, product: &Product) -> StoreResult<()> {
        self.ensure_writable("put_product")?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = $2, description = $3, price = $4, stock = $5,
                updated_at = $6, deleted_at = $7
            WHERE id = $1
            "#,
        )
        .bind(db_id("put_product", product.id.get())?)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount())
        .bind(product.stock)
        .bind(product.updated_at)
        .bind(product.deleted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("put_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::backend(
                "put_product",
                format!("product {} does not exist", product.id),
            ));
        }
        Ok(())
    }

    async fn adjust_stock(
        &mut self,
        id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<StockChange> {
        self.ensure_writable("adjust_stock")?;
        let db_product_id = db_id("adjust_stock", id.get())?;

        // Check and write in one statement; the row lock taken by the UPDATE
        // serialises concurrent adjusters.
        let sql = format!(
            "UPDATE products SET stock = stock + $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL AND stock + $2 >= 0 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(db_product_id)
            .bind(delta)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("adjust_stock", e))?;

        if let Some(row) = updated {
            return Ok(StockChange::Applied(Product::try_from(row)?));
        }

        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 AND deleted_at IS NULL")
                .bind(db_product_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("adjust_stock", e))?;

        Ok(match available {
            Some(available) => StockChange::Insufficient { available },
            None => StockChange::Missing,
        })
    }

    async fn scan_products(&mut self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE deleted_at IS NULL"
        ));
        for predicate in filter.predicates() {
            match predicate {
                ProductPredicate::NameContains(needle) => {
                    query.push(" AND strpos(name, ").push_bind(needle).push(") > 0");
                }
                ProductPredicate::DescriptionContains(needle) => {
                    query
                        .push(" AND strpos(description, ")
                        .push_bind(needle)
                        .push(") > 0");
                }
                ProductPredicate::MinPrice(min) => {
                    query.push(" AND price >= ").push_bind(min);
                }
                ProductPredicate::MaxPrice(max) => {
                    query.push(" AND price <= ").push_bind(max);
                }
                ProductPredicate::MinStock(min) => {
                    query.push(" AND stock >= ").push_bind(min);
                }
                ProductPredicate::MaxStock(max) => {
                    query.push(" AND stock <= ").push_bind(max);
                }
            }
        }
        query.push(" ORDER BY id ASC");

        let rows = query
            .build_query_as::<ProductRow>()
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("scan_products", e))?;
        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get_association(&mut self, key: AssociationKey) -> StoreResult<Option<Association>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM order_products WHERE order_id = $1 AND product_id = $2"
        );
        let row = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(db_id("get_association", key.order_id.get())?)
            .bind(db_id("get_association", key.product_id.get())?)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_association", e))?;
        row.map(Association::try_from).transpose()
    }

    async fn insert_association(&mut self, association: &Association) -> StoreResult<bool> {
        self.ensure_writable("insert_association")?;
        let result = sqlx::query(
            r#"
            INSERT INTO order_products (order_id, product_id, quantity, unit_price, linked_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (order_id, product_id) DO NOTHING
            "#,
        )
        .bind(db_id("insert_association", association.order_id.get())?)
        .bind(db_id("insert_association", association.product_id.get())?)
        .bind(i64::from(association.quantity.get()))
        .bind(association.unit_price.amount())
        .bind(association.linked_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_association", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_association(&mut self, key: AssociationKey) -> StoreResult<bool> {
        self.ensure_writable("delete_association")?;
        let result =
            sqlx::query("DELETE FROM order_products WHERE order_id = $1 AND product_id = $2")
                .bind(db_id("delete_association", key.order_id.get())?)
                .bind(db_id("delete_association", key.product_id.get())?)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("delete_association", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn associations_for_order(&mut self, id: OrderId) -> StoreResult<Vec<Association>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM order_products WHERE order_id = $1 ORDER BY link_seq ASC"
        );
        let rows = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(db_id("associations_for_order", id.get())?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("associations_for_order", e))?;
        rows.into_iter().map(Association::try_from).collect()
    }

    async fn associations_for_product(
        &mut self,
        id: ProductId,
    ) -> StoreResult<Vec<Association>> {
        let sql = format!(
            "SELECT {LINK_COLUMNS} FROM order_products WHERE product_id = $1 ORDER BY link_seq ASC"
        );
        let rows = sqlx::query_as::<_, LinkRow>(&sql)
            .bind(db_id("associations_for_product", id.get())?)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("associations_for_product", e))?;
        rows.into_iter().map(Association::try_from).collect()
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: OrderId::try_from(row.id).map_err(|e| StoreError::decode("order", e.to_string()))?,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    description: String,
    price: Decimal,
    stock: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let decode = |e: orderlink_core::DomainError| StoreError::decode("product", e.to_string());
        Ok(Product {
            id: ProductId::try_from(row.id).map_err(decode)?,
            name: row.name,
            description: row.description,
            price: Price::new(row.price).map_err(decode)?,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LinkRow {
    order_id: i64,
    product_id: i64,
    quantity: i64,
    unit_price: Decimal,
    linked_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for Association {
    type Error = StoreError;

    fn try_from(row: LinkRow) -> Result<Self, Self::Error> {
        let decode =
            |e: orderlink_core::DomainError| StoreError::decode("association", e.to_string());
        Ok(Association {
            order_id: OrderId::try_from(row.order_id).map_err(decode)?,
            product_id: ProductId::try_from(row.product_id).map_err(decode)?,
            quantity: Quantity::new(row.quantity).map_err(decode)?,
            unit_price: Price::new(row.unit_price).map_err(decode)?,
            linked_at: row.linked_at,
        })
    }
}

/// Identifiers are `BIGSERIAL` columns.
fn db_id(operation: &'static str, id: u64) -> StoreResult<i64> {
    i64::try_from(id)
        .map_err(|_| StoreError::backend(operation, format!("identifier {id} out of range")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let detail = match db_err.code().as_deref() {
                Some("23505") => "unique violation",
                Some("23514") => "check constraint violation",
                Some("40001") => "serialization failure",
                Some("25006") => "read-only transaction",
                _ => "database error",
            };
            StoreError::backend(operation, format!("{detail}: {}", db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::decode("row", format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => StoreError::backend(operation, "connection pool closed"),
        _ => StoreError::backend(operation, err.to_string()),
    }
}
