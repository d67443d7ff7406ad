use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use orderlink_core::{DomainError, DomainResult, ValueObject};

/// Non-negative monetary amount with at most two fractional digits.
///
/// No currency handling: a price is a number that gets snapshotted onto
/// associations at link time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    pub const MAX_SCALE: u32 = 2;

    pub const ZERO: Price = Price(Decimal::ZERO);

    /// Largest storable price; persisted as `NUMERIC(12, 2)`.
    pub const MAX: Price = Price(Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2));

    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("price cannot be negative"));
        }
        if amount.normalize().scale() > Self::MAX_SCALE {
            return Err(DomainError::validation(format!(
                "price cannot have more than {} decimal places",
                Self::MAX_SCALE
            )));
        }
        if amount > Self::MAX.0 {
            return Err(DomainError::validation(format!(
                "price cannot exceed {}",
                Self::MAX
            )));
        }
        Ok(Self(amount.abs()))
    }

    /// Smallest-unit constructor (e.g. cents), mirroring how catalog prices are
    /// usually entered.
    pub fn from_minor_units(minor: u64) -> DomainResult<Self> {
        Self::new(Decimal::from(minor) / Decimal::ONE_HUNDRED)
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for Price {}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self {
        value.0
    }
}
