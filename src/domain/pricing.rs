//! Pricing Calculator
//!
//! Shipping fee, flat-rate tax and grand total for a set of priced lines.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::value_objects::Money;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingOption {
    #[default]
    Standard,
    Express,
}

impl ShippingOption {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Standard => "standard", Self::Express => "express" }
    }

    pub fn label(&self) -> &'static str {
        match self { Self::Standard => "Standard Shipping (5-7 business days)", Self::Express => "Express Shipping (2-3 business days)" }
    }
}

impl fmt::Display for ShippingOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ShippingOption {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "express" => Ok(Self::Express),
            other => Err(format!("unknown shipping option `{other}`")),
        }
    }
}

/// Subtotal, shipping, tax and total of an order or cart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Fraction of the subtotal, 0.07 for 7%.
    pub tax_rate: Decimal,
    /// Standard shipping is waived when the subtotal is strictly above this.
    pub free_shipping_threshold: Money,
    pub standard_fee: Money,
    pub express_fee: Money,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate: Decimal::new(7, 2),
            free_shipping_threshold: Money::from_cents(15_000),
            standard_fee: Money::from_cents(1_500),
            express_fee: Money::from_cents(2_500),
        }
    }
}

impl PricingPolicy {
    pub fn shipping_fee(&self, option: ShippingOption, subtotal: Money) -> Money {
        match option {
            ShippingOption::Standard if subtotal > self.free_shipping_threshold => Money::ZERO,
            ShippingOption::Standard => self.standard_fee,
            ShippingOption::Express => self.express_fee,
        }
    }

    pub fn tax(&self, subtotal: Money) -> Money { subtotal.percent(self.tax_rate) }

    /// Prices `(unit price, quantity)` lines.
    pub fn quote<I>(&self, lines: I, option: ShippingOption) -> Totals
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        let subtotal: Money = lines.into_iter().map(|(price, qty)| price * qty).sum();
        self.totals_for(subtotal, option)
    }

    pub fn totals_for(&self, subtotal: Money, option: ShippingOption) -> Totals {
        let shipping = self.shipping_fee(option, subtotal);
        let tax = self.tax(subtotal);
        Totals { subtotal, shipping, tax, total: subtotal + shipping + tax }
    }
}
