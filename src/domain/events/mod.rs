//! Domain events
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Money, OrderNumber};

#[derive(Clone, Debug, PartialEq)]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: OrderNumber, owner_id: Option<Uuid>, total: Money },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus, expected_delivery_date: Option<NaiveDate> },
}

impl OrderEvent {
    /// Emits the event to the tracing subscriber.
    pub fn log(&self) {
        match self {
            Self::Placed { order_id, order_number, owner_id, total } => tracing::info!(
                %order_id, %order_number, guest = owner_id.is_none(), %total, "order placed"
            ),
            Self::StatusChanged { order_id, from, to, expected_delivery_date } => tracing::info!(
                %order_id, from = from.as_str(), to = to.as_str(), ?expected_delivery_date, "order status changed"
            ),
        }
    }
}
