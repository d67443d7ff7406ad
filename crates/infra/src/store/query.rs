//! Filter objects for ad-hoc product and order queries.
//!
//! A filter is a bag of independently optional constraints. Stores never read the
//! fields directly: they ask the filter for its predicate sequence and fold it
//! over their base query (iterator adapters in memory, bound `WHERE` clauses in
//! Postgres). Absent fields contribute no predicate, so the empty filter is the
//! identity and every supplied field narrows the result (conjunction).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderlink_core::ProductId;
use orderlink_orders::{AssociationKey, Order};
use orderlink_products::Product;

/// Optional constraints over products.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Case-sensitive substring of the name.
    pub name_contains: Option<String>,
    /// Case-sensitive substring of the description.
    pub description_contains: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
}

impl ProductFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name_contains(mut self, needle: impl Into<String>) -> Self {
        self.name_contains = Some(needle.into());
        self
    }

    pub fn description_contains(mut self, needle: impl Into<String>) -> Self {
        self.description_contains = Some(needle.into());
        self
    }

    pub fn min_price(mut self, price: Decimal) -> Self {
        self.min_price = Some(price);
        self
    }

    pub fn max_price(mut self, price: Decimal) -> Self {
        self.max_price = Some(price);
        self
    }

    pub fn min_stock(mut self, stock: i64) -> Self {
        self.min_stock = Some(stock);
        self
    }

    pub fn max_stock(mut self, stock: i64) -> Self {
        self.max_stock = Some(stock);
        self
    }

    /// The supplied constraints, in a fixed order.
    pub fn predicates(&self) -> Vec<ProductPredicate> {
        [
            self.name_contains.clone().map(ProductPredicate::NameContains),
            self.description_contains
                .clone()
                .map(ProductPredicate::DescriptionContains),
            self.min_price.map(ProductPredicate::MinPrice),
            self.max_price.map(ProductPredicate::MaxPrice),
            self.min_stock.map(ProductPredicate::MinStock),
            self.max_stock.map(ProductPredicate::MaxStock),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates().is_empty()
    }
}

/// One product constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductPredicate {
    NameContains(String),
    DescriptionContains(String),
    MinPrice(Decimal),
    MaxPrice(Decimal),
    MinStock(i64),
    MaxStock(i64),
}

impl ProductPredicate {
    pub fn matches(&self, product: &Product) -> bool {
        match self {
            ProductPredicate::NameContains(needle) => product.name.contains(needle.as_str()),
            ProductPredicate::DescriptionContains(needle) => {
                product.description.contains(needle.as_str())
            }
            ProductPredicate::MinPrice(min) => product.price.amount() >= *min,
            ProductPredicate::MaxPrice(max) => product.price.amount() <= *max,
            ProductPredicate::MinStock(min) => product.stock >= *min,
            ProductPredicate::MaxStock(max) => product.stock <= *max,
        }
    }
}

/// Optional constraints over orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Case-sensitive substring of the description.
    pub description_contains: Option<String>,
    /// Only orders linked to this product.
    pub contains_product: Option<ProductId>,
    /// Attach each order's product lines to the result.
    pub include_products: bool,
}

impl OrderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description_contains(mut self, needle: impl Into<String>) -> Self {
        self.description_contains = Some(needle.into());
        self
    }

    pub fn contains_product(mut self, product_id: ProductId) -> Self {
        self.contains_product = Some(product_id);
        self
    }

    pub fn with_products(mut self) -> Self {
        self.include_products = true;
        self
    }

    /// The supplied row constraints. `include_products` shapes the result and is
    /// not a predicate.
    pub fn predicates(&self) -> Vec<OrderPredicate> {
        [
            self.description_contains
                .clone()
                .map(OrderPredicate::DescriptionContains),
            self.contains_product.map(OrderPredicate::ContainsProduct),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// One order constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderPredicate {
    DescriptionContains(String),
    ContainsProduct(ProductId),
}

impl OrderPredicate {
    /// `is_linked` answers whether an association exists for a key.
    pub fn matches(&self, order: &Order, is_linked: impl Fn(AssociationKey) -> bool) -> bool {
        match self {
            OrderPredicate::DescriptionContains(needle) => {
                order.description.contains(needle.as_str())
            }
            OrderPredicate::ContainsProduct(product_id) => {
                is_linked(AssociationKey::new(order.id, *product_id))
            }
        }
    }
}
