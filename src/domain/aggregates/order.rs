//! Order Aggregate

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::draft::{Address, ContactInfo, OrderDraft};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::{PricingPolicy, ShippingOption, Totals};
use crate::domain::value_objects::{Money, OrderNumber};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    /// `None` for guest checkout; never assigned after creation.
    pub owner_id: Option<Uuid>,
    pub order_number: OrderNumber,
    pub contact: ContactInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_option: ShippingOption,
    pub notes: Option<String>,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub totals: Totals,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub expected_delivery_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
    #[serde(skip)]
    pub idempotency_key: Option<Uuid>,
    #[serde(skip)]
    pub(crate) events: Vec<OrderEvent>,
}

/// A line of an order. Name and unit price are snapshots taken at order time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: i64,
    pub name: String,
    pub image_ref: Option<String>,
    pub unit_price: Money,
    pub quantity: u32,
    pub line_total: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// The normal forward sequence; `Cancelled` sits outside it.
    pub const PROGRESSION: [OrderStatus; 4] = [Self::Pending, Self::Processing, Self::OutForDelivery, Self::Delivered];
    pub const TERMINAL: [OrderStatus; 2] = [Self::Delivered, Self::Cancelled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { Self::TERMINAL.contains(self) }

    /// Position in [`Self::PROGRESSION`], `None` for `Cancelled`.
    pub fn stage_index(&self) -> Option<usize> { Self::PROGRESSION.iter().position(|s| s == self) }

    /// Forward moves (skipping allowed) and re-stating the current status are
    /// valid from any non-terminal status, as is cancelling. Nothing leaves a
    /// terminal status.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.stage_index(), target.stage_index()) {
            (_, None) => true,
            (Some(from), Some(to)) => to >= from,
            (None, Some(_)) => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed" }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::CreditCard => "credit_card", Self::Paypal => "paypal" }
    }

    pub fn label(&self) -> &'static str {
        match self { Self::CreditCard => "Credit Card", Self::Paypal => "PayPal" }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(Self::CreditCard),
            "paypal" => Ok(Self::Paypal),
            other => Err(format!("unknown payment method `{other}`")),
        }
    }
}

impl Order {
    /// Materializes a new pending order from a draft. Monetary totals are
    /// derived from the draft's unit prices and quantities; any totals the
    /// client sent are not consulted.
    pub fn place(draft: &OrderDraft, owner_id: Option<Uuid>, pricing: &PricingPolicy, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if draft.order_items.is_empty() {
            return Err(OrderError::NoItems);
        }
        let id = Uuid::now_v7();
        let items: Vec<OrderItem> = draft
            .order_items
            .iter()
            .map(|line| {
                let unit_price = Money::from(line.unit_price);
                OrderItem {
                    id: Uuid::now_v7(),
                    order_id: id,
                    product_id: line.product_id,
                    name: line.name.trim().to_string(),
                    image_ref: line.image_ref.clone(),
                    unit_price,
                    quantity: line.quantity,
                    line_total: unit_price * line.quantity,
                }
            })
            .collect();
        let details = &draft.order_data;
        let subtotal: Money = items.iter().map(|i| i.line_total).sum();
        let totals = pricing.totals_for(subtotal, details.shipping_option);
        let order_number = OrderNumber::generate();

        let mut order = Self {
            id,
            owner_id,
            order_number: order_number.clone(),
            contact: details.contact.clone(),
            shipping_address: details.shipping_address.clone(),
            billing_address: draft.billing_address().clone(),
            shipping_option: details.shipping_option,
            notes: details.notes.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(String::from),
            status: OrderStatus::Pending,
            totals,
            payment_method: details.payment_method,
            payment_status: PaymentStatus::Pending,
            expected_delivery_date: None,
            created_at: now,
            updated_at: now,
            items,
            idempotency_key: None,
            events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: id, order_number, owner_id, total: totals.total });
        Ok(order)
    }

    pub fn is_guest(&self) -> bool { self.owner_id.is_none() }

    pub fn items_subtotal(&self) -> Money { self.items.iter().map(|i| i.line_total).sum() }

    /// Replaces the order number, used when the generated one collides.
    pub fn renumber(&mut self) {
        self.order_number = OrderNumber::generate();
        for event in &mut self.events {
            if let OrderEvent::Placed { order_number, .. } = event {
                *order_number = self.order_number.clone();
            }
        }
    }

    /// Whether placing `draft` would record the same contact, addresses,
    /// options and lines as this order. Client totals are not part of it.
    pub fn matches_draft(&self, draft: &OrderDraft) -> bool {
        let details = &draft.order_data;
        let same_lines = self.items.len() == draft.order_items.len()
            && self.items.iter().zip(&draft.order_items).all(|(item, line)| {
                item.product_id == line.product_id
                    && item.name == line.name.trim()
                    && item.unit_price == Money::from(line.unit_price)
                    && item.quantity == line.quantity
                    && item.image_ref == line.image_ref
            });
        same_lines
            && self.contact == details.contact
            && self.shipping_address == details.shipping_address
            && &self.billing_address == draft.billing_address()
            && self.shipping_option == details.shipping_option
            && self.payment_method == details.payment_method
            && self.notes.as_deref() == details.notes.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }

    /// Moves the order to `to`. An absent delivery date leaves the current
    /// estimate untouched.
    pub fn transition(&mut self, to: OrderStatus, expected_delivery_date: Option<NaiveDate>, at: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        if let Some(date) = expected_delivery_date {
            if date < self.created_at.date_naive() {
                return Err(OrderError::DeliveryBeforeOrder { date });
            }
            self.expected_delivery_date = Some(date);
        }
        let from = self.status;
        self.status = to;
        self.updated_at = at;
        self.raise_event(OrderEvent::StatusChanged { order_id: self.id, from, to, expected_delivery_date: self.expected_delivery_date });
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<OrderEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order must contain at least one item")]
    NoItems,
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("expected delivery date {date} is before the order was placed")]
    DeliveryBeforeOrder { date: NaiveDate },
}
