use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderlink_core::{DomainError, DomainResult, Entity, ProductId};

use crate::price::Price;

/// Longest accepted product name, in characters.
pub const NAME_MAX_CHARS: usize = 255;

/// Longest accepted product description, in characters.
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Validated mutable fields of a product (input to create and full-replace update).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    name: String,
    description: String,
    price: Price,
    stock: i64,
}

impl ProductDraft {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        price: Decimal,
        stock: i64,
    ) -> DomainResult<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::validation("product name cannot be empty"));
        }
        if name.chars().count() > NAME_MAX_CHARS {
            return Err(DomainError::validation(format!(
                "product name cannot exceed {NAME_MAX_CHARS} characters"
            )));
        }

        let description = description.into();
        if description.chars().count() > DESCRIPTION_MAX_CHARS {
            return Err(DomainError::validation(format!(
                "product description cannot exceed {DESCRIPTION_MAX_CHARS} characters"
            )));
        }

        let price = Price::new(price)?;

        if stock < 0 {
            return Err(DomainError::validation("product stock cannot be negative"));
        }

        Ok(Self {
            name,
            description,
            price,
            stock,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn stock(&self) -> i64 {
        self.stock
    }
}

/// Product record as held by the product ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Materialize a freshly created product from a store-assigned id.
    pub fn create(id: ProductId, draft: ProductDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: draft.name,
            description: draft.description,
            price: draft.price,
            stock: draft.stock,
            created_at: at,
            updated_at: at,
            deleted_at: None,
        }
    }

    /// Full replace of the mutable fields.
    pub fn apply_draft(&mut self, draft: ProductDraft, at: DateTime<Utc>) {
        self.name = draft.name;
        self.description = draft.description;
        self.price = draft.price;
        self.stock = draft.stock;
        self.updated_at = at;
    }

    pub fn tombstone(&mut self, at: DateTime<Utc>) {
        self.deleted_at = Some(at);
        self.updated_at = at;
    }

    /// Stock level after applying `delta`, or a conflict if it would go negative.
    ///
    /// This is the pure half of the conditional decrement; stores call it while
    /// holding their write guard on the product.
    pub fn stock_after(&self, delta: i64) -> DomainResult<i64> {
        match self.stock.checked_add(delta) {
            Some(next) if next >= 0 => Ok(next),
            Some(_) => Err(DomainError::insufficient_stock(self.stock, delta.saturating_neg())),
            None => Err(DomainError::validation("stock adjustment overflows")),
        }
    }

    /// Apply a stock change, enforcing stock >= 0.
    pub fn adjust_stock(&mut self, delta: i64, at: DateTime<Utc>) -> DomainResult<()> {
        self.stock = self.stock_after(delta)?;
        self.updated_at = at;
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> ProductId {
        self.id
    }

    fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn sample(stock: i64) -> Product {
        let draft = ProductDraft::new("Widget", "A widget", dec!(5.00), stock).unwrap();
        Product::create(ProductId::new(1), draft, test_time())
    }

    #[test]
    fn draft_trims_name() {
        let draft = ProductDraft::new("  Widget  ", "", dec!(1), 0).unwrap();
        assert_eq!(draft.name(), "Widget");
    }

    #[test]
    fn draft_rejects_blank_name() {
        let err = ProductDraft::new("   ", "", dec!(1), 0).unwrap_err();
        assert_eq!(err, DomainError::validation("product name cannot be empty"));
    }

    #[test]
    fn draft_rejects_negative_price_and_stock() {
        assert!(matches!(
            ProductDraft::new("Widget", "", dec!(-1), 0),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            ProductDraft::new("Widget", "", dec!(1), -1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn draft_rejects_overlong_description() {
        let long = "x".repeat(DESCRIPTION_MAX_CHARS + 1);
        assert!(matches!(
            ProductDraft::new("Widget", long, dec!(1), 0),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn create_sets_timestamps_and_no_tombstone() {
        let p = sample(10);
        assert_eq!(p.created_at, p.updated_at);
        assert!(!p.is_tombstoned());
        assert_eq!(p.stock, 10);
    }

    #[test]
    fn stock_after_rejects_going_negative() {
        let p = sample(10);
        assert_eq!(p.stock_after(-10).unwrap(), 0);
        assert_eq!(
            p.stock_after(-11).unwrap_err(),
            DomainError::insufficient_stock(10, 11)
        );
    }

    #[test]
    fn adjust_stock_leaves_state_untouched_on_conflict() {
        let mut p = sample(3);
        let before = p.clone();
        assert!(p.adjust_stock(-4, test_time()).is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn tombstone_hides_entity() {
        let mut p = sample(1);
        p.tombstone(test_time());
        assert!(p.is_tombstoned());
        assert!(p.live().is_none());
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: no sequence of adjustments can drive stock below zero.
            #[test]
            fn stock_never_negative(
                initial in 0i64..1_000,
                deltas in proptest::collection::vec(-500i64..500, 0..50)
            ) {
                let mut p = sample(initial);
                for delta in deltas {
                    let before = p.stock;
                    match p.adjust_stock(delta, Utc::now()) {
                        Ok(()) => prop_assert_eq!(p.stock, before + delta),
                        Err(_) => prop_assert_eq!(p.stock, before),
                    }
                    prop_assert!(p.stock >= 0);
                }
            }

            /// Property: any non-blank name within bounds is accepted as-is (trimmed).
            #[test]
            fn reasonable_drafts_are_accepted(
                name in "[A-Za-z][A-Za-z0-9 ]{0,99}",
                cents in 0u64..1_000_000,
                stock in 0i64..10_000
            ) {
                let price = Price::from_minor_units(cents).unwrap().amount();
                let draft = ProductDraft::new(name.clone(), "", price, stock).unwrap();
                prop_assert_eq!(draft.name(), name.trim());
                prop_assert_eq!(draft.stock(), stock);
            }
        }
    }
}
