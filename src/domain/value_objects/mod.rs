//! Value Objects for the order lifecycle

use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};

/// Money value object.
///
/// Always held at two decimal places; arithmetic rounds half away from zero
/// so that order totals never drift.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        let mut amount = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        amount.rescale(2);
        Self(amount)
    }

    /// Builds an amount from integer cents, e.g. `Money::from_cents(7385)` is 73.85.
    pub fn from_cents(cents: i64) -> Self { Self::new(Decimal::new(cents, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.0 * Decimal::from(qty)) }

    /// Applies a fractional rate (0.07 for 7%) and rounds to cents.
    pub fn percent(&self, rate: Decimal) -> Money { Money::new(self.0 * rate) }
}

impl Default for Money { fn default() -> Self { Self::ZERO } }

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self::new(amount) }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        let mut amount = money.0;
        amount.rescale(2);
        amount
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, other: Money) -> Money { Money::new(self.0 + other.0) }
}

impl Mul<u32> for Money {
    type Output = Money;
    fn mul(self, qty: u32) -> Money { self.multiply(qty) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, Add::add) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() { write!(f, "-${:.2}", self.0.abs()) } else { write!(f, "${:.2}", self.0) }
    }
}

/// Customer-facing order number, e.g. `ORD-04821937`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
        Self(format!("ORD-{n:08}"))
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, OrderNumberError> {
        let value = value.into().trim().to_uppercase();
        let digits = value.strip_prefix("ORD-").ok_or(OrderNumberError::MissingPrefix)?;
        if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(OrderNumberError::BadDigits);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderNumberError {
    #[error("order number must start with ORD-")]
    MissingPrefix,
    #[error("order number must end in eight digits")]
    BadDigits,
}
