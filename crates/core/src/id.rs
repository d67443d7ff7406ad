//! Strongly-typed identifiers used across the domain.
//!
//! Identifiers are assigned by the entity store on creation from a per-kind,
//! monotonically increasing sequence, so ordering by identifier is ordering by
//! creation.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

/// Identifier of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(u64);

macro_rules! impl_sequence_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Wrap a raw store-assigned value.
            ///
            /// Zero is never assigned by a store; prefer `FromStr` for untrusted input.
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for u64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                match u64::try_from(value) {
                    Ok(v) if v > 0 => Ok(Self(v)),
                    _ => Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, value
                    ))),
                }
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<u64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if value == 0 {
                    return Err(DomainError::invalid_id(format!("{}: must be positive", $name)));
                }
                Ok(Self(value))
            }
        }
    };
}

impl_sequence_newtype!(OrderId, "OrderId");
impl_sequence_newtype!(ProductId, "ProductId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_identifiers() {
        assert_eq!("42".parse::<OrderId>().unwrap(), OrderId::new(42));
        assert_eq!(" 7 ".parse::<ProductId>().unwrap().get(), 7);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(matches!("0".parse::<OrderId>(), Err(DomainError::InvalidId(_))));
        assert!(matches!("abc".parse::<ProductId>(), Err(DomainError::InvalidId(_))));
        assert!(ProductId::try_from(-3_i64).is_err());
    }

    #[test]
    fn identifiers_order_by_value() {
        let mut ids = vec![ProductId::new(3), ProductId::new(1), ProductId::new(2)];
        ids.sort();
        assert_eq!(ids, vec![ProductId::new(1), ProductId::new(2), ProductId::new(3)]);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: display and parse agree for every assignable identifier.
            #[test]
            fn display_parses_back(value in 1u64..) {
                let id = OrderId::new(value);
                prop_assert_eq!(id.to_string().parse::<OrderId>().unwrap(), id);
            }

            /// Property: database ids convert iff they are positive.
            #[test]
            fn signed_conversion_accepts_only_positive(value in any::<i64>()) {
                prop_assert_eq!(ProductId::try_from(value).is_ok(), value > 0);
            }
        }
    }
}
