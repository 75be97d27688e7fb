//! Order draft: the single accepted shape of an order submission.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::domain::aggregates::PaymentMethod;
use crate::domain::pricing::{ShippingOption, Totals};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ContactInfo {
    #[validate(length(min = 2, max = 50, message = "first name must be at least 2 characters"))]
    pub first_name: String,
    #[validate(length(min = 2, max = 50, message = "last name must be at least 2 characters"))]
    pub last_name: String,
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
}

impl ContactInfo {
    pub fn full_name(&self) -> String { format!("{} {}", self.first_name.trim(), self.last_name.trim()) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Address {
    #[validate(length(min = 5, max = 200, message = "address is required"))]
    pub address: String,
    #[validate(length(min = 2, max = 100, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 2, max = 100, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 3, max = 10, message = "zip code is required"))]
    pub zip: String,
    #[validate(length(min = 2, max = 100, message = "country is required"))]
    pub country: String,
}

impl Address {
    /// Display lines, street first.
    pub fn lines(&self) -> Vec<String> {
        vec![
            self.address.clone(),
            format!("{}, {} {}", self.city, self.state, self.zip),
            self.country.clone(),
        ]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DraftItem {
    pub product_id: i64,
    #[validate(length(min = 1, max = 200, message = "item name is required"))]
    pub name: String,
    pub unit_price: Decimal,
    #[validate(range(min = 1, max = 10000, message = "quantity must be between 1 and 10000"))]
    pub quantity: u32,
    #[serde(default)]
    pub image_ref: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderDetails {
    #[validate]
    pub contact: ContactInfo,
    #[validate]
    pub shipping_address: Address,
    #[serde(default = "default_true")]
    pub billing_same_as_shipping: bool,
    #[serde(default)]
    #[validate]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub shipping_option: ShippingOption,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
    /// Totals as computed by the client. Compared against the server's own
    /// figures and otherwise ignored.
    #[serde(default)]
    pub client_totals: Option<Totals>,
}

fn default_true() -> bool { true }

/// 1,000,000,000.00: upper bound for a line total and for the subtotal.
/// Leaves headroom for tax and shipping within `NUMERIC(12, 2)`.
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(1_215_752_192, 23, 0, false, 2);

/// Body of `POST /orders`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderDraft {
    #[validate]
    pub order_data: OrderDetails,
    #[validate]
    pub order_items: Vec<DraftItem>,
}

impl OrderDraft {
    /// Runs every field rule and the cross-field rules the derive cannot express.
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::default(),
            Err(e) => FieldErrors::from_validation(&e, ""),
        };
        if self.order_items.is_empty() {
            errors.add("orderItems", "order must contain at least one item");
        }
        let mut subtotal = Some(Decimal::ZERO);
        for (i, item) in self.order_items.iter().enumerate() {
            let line_total = item.unit_price.checked_mul(Decimal::from(item.quantity));
            if item.unit_price.is_sign_negative() && !item.unit_price.is_zero() {
                errors.add(format!("orderItems[{i}].unitPrice"), "unit price must not be negative");
            } else if item.unit_price.normalize().scale() > 2 {
                errors.add(format!("orderItems[{i}].unitPrice"), "unit price must have at most two decimal places");
            } else if line_total.map_or(true, |total| total > MAX_ORDER_AMOUNT) {
                errors.add(format!("orderItems[{i}].unitPrice"), format!("line total must not exceed {MAX_ORDER_AMOUNT}"));
            }
            subtotal = subtotal.zip(line_total).and_then(|(sum, line)| sum.checked_add(line));
        }
        if errors.is_empty() && subtotal.map_or(true, |sum| sum > MAX_ORDER_AMOUNT) {
            errors.add("orderItems", format!("order subtotal must not exceed {MAX_ORDER_AMOUNT}"));
        }
        let details = &self.order_data;
        if !details.billing_same_as_shipping && details.billing_address.is_none() {
            errors.add("orderData.billingAddress", "billing address is required");
        }
        errors.into_result()
    }

    /// The billing address after resolving "same as shipping".
    pub fn billing_address(&self) -> &Address {
        let details = &self.order_data;
        match (&details.billing_address, details.billing_same_as_shipping) {
            (Some(billing), false) => billing,
            _ => &details.shipping_address,
        }
    }
}

pub(crate) fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone.chars().all(|c| c.is_ascii_digit() || " +-().".contains(c));
    if allowed && (7..=15).contains(&digits) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone");
        err.message = Some("invalid phone number".into());
        Err(err)
    }
}

/// Field-level validation messages keyed by camelCase path,
/// e.g. `orderData.contact.email` or `orderItems[0].quantity`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn contains(&self, field: &str) -> bool { self.0.contains_key(field) }
    pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }

    /// Flattens nested `validator` output under `prefix`.
    pub fn from_validation(errors: &ValidationErrors, prefix: &str) -> Self {
        let mut out = Self::default();
        collect(errors, prefix, &mut out);
        out
    }
}

fn collect(errors: &ValidationErrors, prefix: &str, out: &mut FieldErrors) {
    for (field, kind) in errors.errors() {
        let path = join_path(prefix, &camel_case(field));
        match kind {
            ValidationErrorsKind::Field(list) => {
                for e in list {
                    let message = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
                    out.add(path.clone(), message);
                }
            }
            ValidationErrorsKind::Struct(inner) => collect(inner, &path, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect(inner, &format!("{path}[{index}]"), out);
                }
            }
        }
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") }
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(field, msgs)| format!("{field}: {}", msgs.join(", "))).collect();
        f.write_str(&parts.join("; "))
    }
}
