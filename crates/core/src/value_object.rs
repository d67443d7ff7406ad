//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; two value objects with the same values are
//! equal. In this workspace `Price` and `Quantity` are value objects while
//! `Order` and `Product` are entities.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. Construction is the
/// only place validation happens, so holding one is proof the value is valid:
///
/// ```ignore
/// let price = Price::new(dec!(5.00))?; // validated once
/// let snapshot = price;                // copied freely afterwards
/// assert_eq!(price, snapshot);
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
