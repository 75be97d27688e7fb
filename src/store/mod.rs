//! Order persistence.
//!
//! An order header and its items are only ever written through an
//! [`OrderTx`]; dropping a transaction without committing discards
//! everything written through it.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderItem, OrderStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    OrderNumber,
    IdempotencyKey,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("duplicate {0:?}")]
    Duplicate(UniqueKey),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Admin listing filter. Dates are inclusive calendar days in UTC.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub owner_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        let day = order.created_at.date_naive();
        self.status.map_or(true, |s| order.status == s)
            && self.owner_id.map_or(true, |o| order.owner_id == Some(o))
            && self.start_date.map_or(true, |d| day >= d)
            && self.end_date.map_or(true, |d| day <= d)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Clamps to page >= 1 and 1 <= limit <= 100.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(self.limit) }
}

impl Default for PageRequest {
    fn default() -> Self { Self::new(None, None) }
}

#[async_trait]
pub trait OrderTx: Send {
    async fn insert_header(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn insert_item(&mut self, item: &OrderItem, position: u32) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError>;
    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError>;
    /// One page of matching orders, newest first, and the total match count.
    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError>;
    /// Writes status, delivery estimate and `updated_at` unless the stored
    /// order is already terminal. `Ok(None)` when no row was updated.
    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        expected_delivery_date: Option<NaiveDate>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Order>, StoreError>;
}
