//! Order↔product association (the link entity of the many-to-many relation).
//!
//! An association is created only when a product is added to an order and
//! destroyed only when it is removed. It is keyed by the (order, product) pair,
//! so there is at most one link per pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use orderlink_core::{DomainError, DomainResult, OrderId, ProductId, ValueObject};
use orderlink_products::{Price, Product};

use crate::order::Order;

/// Positive number of units linked to an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::validation("quantity must be greater than 0"));
        }
        u32::try_from(value)
            .map(Self)
            .map_err(|_| DomainError::validation(format!("quantity cannot exceed {}", u32::MAX)))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Signed stock delta that consumes this quantity.
    pub fn as_decrement(self) -> i64 {
        -i64::from(self.0)
    }
}

impl ValueObject for Quantity {}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Compound key of an association.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssociationKey {
    pub order_id: OrderId,
    pub product_id: ProductId,
}

impl AssociationKey {
    pub fn new(order_id: OrderId, product_id: ProductId) -> Self {
        Self {
            order_id,
            product_id,
        }
    }
}

impl core::fmt::Display for AssociationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "order {} / product {}", self.order_id, self.product_id)
    }
}

/// Link between one order and one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Product price captured when the link was made; later price changes do not
    /// touch it.
    pub unit_price: Price,
    pub linked_at: DateTime<Utc>,
}

impl Association {
    /// Build a link, snapshotting the product's current price.
    pub fn link(order: &Order, product: &Product, quantity: Quantity, at: DateTime<Utc>) -> Self {
        Self {
            order_id: order.id,
            product_id: product.id,
            quantity,
            unit_price: product.price,
            linked_at: at,
        }
    }

    pub fn key(&self) -> AssociationKey {
        AssociationKey::new(self.order_id, self.product_id)
    }
}

/// A product as seen from an order, with the link details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product: Product,
    pub quantity: Quantity,
    pub unit_price: Price,
    pub linked_at: DateTime<Utc>,
}

impl OrderLine {
    pub fn new(association: &Association, product: Product) -> Self {
        Self {
            product,
            quantity: association.quantity,
            unit_price: association.unit_price,
            linked_at: association.linked_at,
        }
    }
}

/// An order as seen from a product, with the link details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductOrderLine {
    pub order: Order,
    pub quantity: Quantity,
    pub unit_price: Price,
    pub linked_at: DateTime<Utc>,
}

impl ProductOrderLine {
    pub fn new(association: &Association, order: Order) -> Self {
        Self {
            order,
            quantity: association.quantity,
            unit_price: association.unit_price,
            linked_at: association.linked_at,
        }
    }
}
