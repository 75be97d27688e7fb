//! In-process order store.
//!
//! Used for development runs without a database and by the test suites.
//! Writes are staged in the transaction and only become visible on commit.
//! Faults can be injected to exercise rollback paths.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderFilter, OrderStore, OrderTx, PageRequest, StoreError, UniqueKey};
use crate::domain::aggregates::{Order, OrderItem, OrderStatus};

#[derive(Debug, Default)]
struct Faults {
    fail_item_at: Option<u32>,
    fail_commit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self { Self::default() }

    /// Makes the item write at `position` (0-based) fail in every later transaction.
    pub fn fail_item_insert_at(&self, position: u32) { self.faults().fail_item_at = Some(position); }

    pub fn fail_commits(&self) { self.faults().fail_commit = true; }

    pub fn clear_faults(&self) { *self.faults() = Faults::default(); }

    pub async fn order_count(&self) -> usize { self.orders.read().await.len() }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct MemoryTx {
    store: MemoryOrderStore,
    header: Option<Order>,
    items: Vec<OrderItem>,
}

#[async_trait]
impl OrderTx for MemoryTx {
    async fn insert_header(&mut self, order: &Order) -> Result<(), StoreError> {
        let mut header = order.clone();
        header.items.clear();
        header.events.clear();
        self.header = Some(header);
        Ok(())
    }

    async fn insert_item(&mut self, item: &OrderItem, position: u32) -> Result<(), StoreError> {
        let injected = self.store.faults().fail_item_at == Some(position);
        if injected {
            return Err(StoreError::Unavailable(format!("injected failure writing item {position}")));
        }
        match &self.header {
            Some(header) if header.id == item.order_id => {
                self.items.push(item.clone());
                Ok(())
            }
            _ => Err(StoreError::Corrupt(format!("item {} references an order not in this transaction", item.id))),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let injected = self.store.faults().fail_commit;
        if injected {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        let MemoryTx { store, header, items } = *self;
        let Some(mut header) = header else {
            return Ok(());
        };
        let mut orders = store.orders.write().await;
        if orders.values().any(|o| o.order_number == header.order_number) {
            return Err(StoreError::Duplicate(UniqueKey::OrderNumber));
        }
        if header.idempotency_key.is_some() && orders.values().any(|o| o.idempotency_key == header.idempotency_key) {
            return Err(StoreError::Duplicate(UniqueKey::IdempotencyKey));
        }
        header.items = items;
        orders.insert(header.id, header);
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError> {
        Ok(Box::new(MemoryTx { store: self.clone(), header: None, items: Vec::new() }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.read().await.values().find(|o| o.idempotency_key == Some(key)).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError> {
        let orders = self.orders.read().await;
        let mut matching: Vec<&Order> = orders.values().filter(|o| filter.matches(o)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let total = matching.len() as u64;
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let rows = matching.into_iter().skip(offset).take(page.limit as usize).cloned().collect();
        Ok((rows, total))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        expected_delivery_date: Option<NaiveDate>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Order>, StoreError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id).filter(|o| !o.status.is_terminal()) else {
            return Ok(None);
        };
        order.status = status;
        if expected_delivery_date.is_some() {
            order.expected_delivery_date = expected_delivery_date;
        }
        order.updated_at = updated_at;
        Ok(Some(order.clone()))
    }
}
