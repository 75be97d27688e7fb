//! Order Tracking Presentation
//!
//! Maps an order onto the customer-facing progress view: a fixed list of
//! stages for orders in flight, or a cancellation notice.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use crate::domain::aggregates::{Order, OrderStatus};

pub const DELIVERY_NOT_AVAILABLE: &str = "Not available";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageView {
    pub status: OrderStatus,
    pub label: &'static str,
    pub completed: bool,
    pub current: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    #[serde(rename_all = "camelCase")]
    InProgress { stages: Vec<StageView>, current_index: usize },
    Cancelled { notice: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineView {
    pub name: String,
    pub image_ref: Option<String>,
    pub quantity: u32,
    pub unit_price: String,
    pub line_total: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    pub order_number: String,
    pub status_label: &'static str,
    pub progress: Progress,
    pub expected_delivery: String,
    pub placed_on: String,
    pub items: Vec<LineView>,
    pub shipping_address: Vec<String>,
    pub billing_address: Vec<String>,
    pub shipping_method: &'static str,
    pub payment_method: &'static str,
    pub subtotal: String,
    pub shipping: String,
    pub tax: String,
    pub total: String,
}

pub fn stage_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order Placed",
        OrderStatus::Processing => "Processing",
        OrderStatus::OutForDelivery => "Out for Delivery",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Cancelled",
    }
}

/// Stages up to and including the current one are completed.
pub fn progress(status: OrderStatus) -> Progress {
    match status.stage_index() {
        Some(current_index) => Progress::InProgress {
            stages: OrderStatus::PROGRESSION
                .iter()
                .enumerate()
                .map(|(i, s)| StageView { status: *s, label: stage_label(*s), completed: i <= current_index, current: i == current_index })
                .collect(),
            current_index,
        },
        None => Progress::Cancelled { notice: "This order has been cancelled.".to_string() },
    }
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%B %-d, %Y").to_string()).unwrap_or_else(|| DELIVERY_NOT_AVAILABLE.to_string())
}

impl TrackingView {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_number: order.order_number.to_string(),
            status_label: stage_label(order.status),
            progress: progress(order.status),
            expected_delivery: format_date(order.expected_delivery_date),
            placed_on: format_date(Some(order.created_at.date_naive())),
            items: order
                .items
                .iter()
                .map(|i| LineView {
                    name: i.name.clone(),
                    image_ref: i.image_ref.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price.to_string(),
                    line_total: i.line_total.to_string(),
                })
                .collect(),
            shipping_address: order.shipping_address.lines(),
            billing_address: order.billing_address.lines(),
            shipping_method: order.shipping_option.label(),
            payment_method: order.payment_method.label(),
            subtotal: order.totals.subtotal.to_string(),
            shipping: order.totals.shipping.to_string(),
            tax: order.totals.tax.to_string(),
            total: order.totals.total.to_string(),
        }
    }
}

/// Plain-text confirmation, as printed on a receipt.
impl fmt::Display for TrackingView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Order {} ({})", self.order_number, self.status_label)?;
        writeln!(f, "Placed on {}", self.placed_on)?;
        match &self.progress {
            Progress::InProgress { stages, .. } => {
                for stage in stages {
                    let mark = if stage.current { ">" } else if stage.completed { "x" } else { " " };
                    writeln!(f, "  [{mark}] {}", stage.label)?;
                }
                writeln!(f, "Expected delivery: {}", self.expected_delivery)?;
            }
            Progress::Cancelled { notice } => writeln!(f, "{notice}")?,
        }
        writeln!(f)?;
        for item in &self.items {
            writeln!(f, "  {} x {} @ {} = {}", item.quantity, item.name, item.unit_price, item.line_total)?;
        }
        writeln!(f)?;
        writeln!(f, "Ship to: {}", self.shipping_address.join(", "))?;
        writeln!(f, "Shipping: {}", self.shipping_method)?;
        writeln!(f, "Payment: {}", self.payment_method)?;
        writeln!(f, "Subtotal: {}", self.subtotal)?;
        writeln!(f, "Shipping fee: {}", self.shipping)?;
        writeln!(f, "Tax: {}", self.tax)?;
        write!(f, "Total: {}", self.total)
    }
}
