//! Order service: submission, retrieval, listing and status changes.

use async_trait::async_trait;
use chrono::{NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::aggregates::{Order, OrderStatus};
use crate::domain::checkout::OrderSubmitter;
use crate::domain::draft::{FieldErrors, OrderDraft};
use crate::domain::pricing::PricingPolicy;
use crate::identity::Caller;
use crate::store::{OrderFilter, OrderStore, PageRequest, StoreError, UniqueKey};
use crate::{Result, StorefrontError};

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

/// Query string of the order listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub customer_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub expected_delivery_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub order: Order,
    /// The idempotency key matched an earlier submission, which is returned
    /// instead of creating a new order.
    pub replayed: bool,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    pricing: PricingPolicy,
}

impl std::fmt::Debug for OrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderService").field("pricing", &self.pricing).finish_non_exhaustive()
    }
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, pricing: PricingPolicy) -> Self { Self { store, pricing } }

    pub fn pricing(&self) -> &PricingPolicy { &self.pricing }

    /// Validates the draft, prices it, and writes header and items in one
    /// transaction. Nothing is left behind when any write fails.
    pub async fn submit_order(&self, draft: OrderDraft, caller: &Caller, idempotency_key: Option<Uuid>) -> Result<Submission> {
        draft.check().map_err(StorefrontError::Validation)?;
        if let Some(key) = idempotency_key {
            if let Some(existing) = self.store.find_by_idempotency_key(key).await? {
                return replay(existing, &draft, caller);
            }
        }

        let mut order = Order::place(&draft, caller.owner_id(), &self.pricing, Utc::now().trunc_subsecs(6))?;
        order.idempotency_key = idempotency_key;
        if let Some(client) = &draft.order_data.client_totals {
            if client != &order.totals {
                warn!(client_total = %client.total, server_total = %order.totals.total, "client totals differ from server pricing, using server totals");
            }
        }

        let mut attempts = 1;
        loop {
            match self.persist(&order).await {
                Ok(()) => break,
                Err(StoreError::Duplicate(UniqueKey::OrderNumber)) if attempts < ORDER_NUMBER_ATTEMPTS => {
                    attempts += 1;
                    order.renumber();
                }
                Err(StoreError::Duplicate(UniqueKey::IdempotencyKey)) => {
                    let existing = match idempotency_key {
                        Some(key) => self.store.find_by_idempotency_key(key).await?,
                        None => None,
                    };
                    return existing.map_or(Err(StorefrontError::IdempotencyConflict), |o| replay(o, &draft, caller));
                }
                Err(e) => {
                    error!(error = %e, order_id = %order.id, "failed to persist order");
                    return Err(e.into());
                }
            }
        }

        for event in order.take_events() {
            event.log();
        }
        Ok(Submission { order, replayed: false })
    }

    async fn persist(&self, order: &Order) -> std::result::Result<(), StoreError> {
        let mut tx = self.store.begin().await?;
        tx.insert_header(order).await?;
        for (position, item) in (0u32..).zip(&order.items) {
            tx.insert_item(item, position).await?;
        }
        tx.commit().await
    }

    pub async fn get_order(&self, id: Uuid, caller: &Caller) -> Result<Order> {
        let order = self.store.find_order(id).await?.ok_or(StorefrontError::OrderNotFound)?;
        authorize_view(caller, &order)?;
        Ok(order)
    }

    /// Admins see every order matching the query. Customers only ever see
    /// their own; a `customerId` in the query cannot widen that.
    pub async fn list_orders(&self, query: OrderQuery, caller: &Caller) -> Result<OrderPage> {
        let owner_id = match caller {
            Caller::Admin(_) => query.customer_id,
            Caller::Customer(id) => Some(*id),
            Caller::Guest => return Err(StorefrontError::Unauthenticated),
        };
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                return Err(StorefrontError::Validation(FieldErrors::single("startDate", "startDate must not be after endDate")));
            }
        }
        let filter = OrderFilter { status: query.status, owner_id, start_date: query.start_date, end_date: query.end_date };
        let page = PageRequest::new(query.page, query.limit);
        let (orders, total) = self.store.list_orders(&filter, page).await?;
        Ok(OrderPage { orders, total, page: page.page, limit: page.limit, total_pages: total.div_ceil(u64::from(page.limit)) })
    }

    /// Admin-only. Moves the order along its status sequence and optionally
    /// records a new expected delivery date.
    pub async fn update_status(&self, id: Uuid, update: StatusUpdate, caller: &Caller) -> Result<Order> {
        require_admin(caller)?;
        let mut order = self.store.find_order(id).await?.ok_or(StorefrontError::OrderNotFound)?;
        let now = Utc::now().trunc_subsecs(6);
        order.transition(update.status, update.expected_delivery_date, now)?;

        let Some(updated) = self.store.update_status(id, update.status, update.expected_delivery_date, now).await? else {
            // Another admin moved it to a terminal status in the meantime.
            return match self.store.find_order(id).await? {
                Some(current) => Err(StorefrontError::InvalidTransition { from: current.status, to: update.status }),
                None => Err(StorefrontError::OrderNotFound),
            };
        };
        for event in order.take_events() {
            event.log();
        }
        Ok(updated)
    }
}

/// Owned orders are visible to their owner and admins; guest orders to
/// anyone holding the id.
pub fn authorize_view(caller: &Caller, order: &Order) -> Result<()> {
    match (order.owner_id, caller) {
        (None, _) | (_, Caller::Admin(_)) => Ok(()),
        (Some(owner), Caller::Customer(id)) if owner == *id => Ok(()),
        (Some(_), Caller::Customer(_)) => Err(StorefrontError::Forbidden),
        (Some(_), Caller::Guest) => Err(StorefrontError::Unauthenticated),
    }
}

pub fn require_admin(caller: &Caller) -> Result<()> {
    match caller {
        Caller::Admin(_) => Ok(()),
        Caller::Customer(_) => Err(StorefrontError::Forbidden),
        Caller::Guest => Err(StorefrontError::Unauthenticated),
    }
}

/// A reused key only replays for the same owner and the same order content.
fn replay(existing: Order, draft: &OrderDraft, caller: &Caller) -> Result<Submission> {
    if existing.owner_id != caller.owner_id() || !existing.matches_draft(draft) {
        warn!(order_id = %existing.id, "idempotency key reused for a different order");
        return Err(StorefrontError::IdempotencyConflict);
    }
    info!(order_id = %existing.id, "replaying idempotent order submission");
    Ok(Submission { order: existing, replayed: true })
}

#[async_trait]
impl OrderSubmitter for OrderService {
    async fn submit_order(&self, draft: OrderDraft, caller: &Caller, idempotency_key: Option<Uuid>) -> Result<Order> {
        OrderService::submit_order(self, draft, caller, idempotency_key).await.map(|s| s.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::draft::fixtures;
    use crate::domain::value_objects::Money;
    use crate::store::MemoryOrderStore;
    use chrono::Duration;

    fn service() -> (OrderService, MemoryOrderStore) {
        let store = MemoryOrderStore::new();
        (OrderService::new(Arc::new(store.clone()), PricingPolicy::default()), store)
    }

    fn admin() -> Caller { Caller::Admin(Uuid::new_v4()) }

    #[tokio::test]
    async fn test_scenario_totals() {
        let (svc, _) = service();
        let order = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap().order;
        assert_eq!(order.totals.subtotal, Money::from_cents(5500));
        assert_eq!(order.totals.shipping, Money::from_cents(1500));
        assert_eq!(order.totals.tax, Money::from_cents(385));
        assert_eq!(order.totals.total, Money::from_cents(7385));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.totals.total, order.totals.subtotal + order.totals.shipping + order.totals.tax);
        assert_eq!(order.items_subtotal(), order.totals.subtotal);
    }

    #[tokio::test]
    async fn test_round_trip_matches_submission() {
        let (svc, _) = service();
        let created = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap().order;
        let fetched = svc.get_order(created.id, &Caller::Guest).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.contact, fixtures::contact());
        assert_eq!(fetched.shipping_address, fixtures::address());
        assert_eq!(fetched.payment_method, fixtures::draft().order_data.payment_method);
    }

    #[tokio::test]
    async fn test_empty_order_creates_nothing() {
        let (svc, store) = service();
        let mut draft = fixtures::draft();
        draft.order_items.clear();
        let err = svc.submit_order(draft, &Caller::Guest, None).await.unwrap_err();
        assert!(matches!(&err, StorefrontError::Validation(f) if f.contains("orderItems")));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_item_write_failure_rolls_back_header() {
        let (svc, store) = service();
        store.fail_item_insert_at(1);
        let err = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_nothing() {
        let (svc, store) = service();
        store.fail_commits();
        assert!(svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.is_err());
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_owner_comes_from_identity() {
        let (svc, _) = service();
        let alice = Uuid::new_v4();
        let owned = svc.submit_order(fixtures::draft(), &Caller::Customer(alice), None).await.unwrap().order;
        assert_eq!(owned.owner_id, Some(alice));
        let guest = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap().order;
        assert_eq!(guest.owner_id, None);
    }

    #[tokio::test]
    async fn test_idempotent_resubmission() {
        let (svc, store) = service();
        let key = Uuid::new_v4();
        let alice = Caller::Customer(Uuid::new_v4());
        let first = svc.submit_order(fixtures::draft(), &alice, Some(key)).await.unwrap();
        let second = svc.submit_order(fixtures::draft(), &alice, Some(key)).await.unwrap();
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.order.id, second.order.id);
        assert_eq!(store.order_count().await, 1);

        let bob = Caller::Customer(Uuid::new_v4());
        assert!(matches!(svc.submit_order(fixtures::draft(), &bob, Some(key)).await, Err(StorefrontError::IdempotencyConflict)));
    }

    #[tokio::test]
    async fn test_reused_key_with_changed_draft_conflicts() {
        let (svc, store) = service();
        let key = Uuid::new_v4();
        svc.submit_order(fixtures::draft(), &Caller::Guest, Some(key)).await.unwrap();

        let mut edited = fixtures::draft();
        edited.order_data.shipping_address.city = "Chicago".into();
        edited.order_items.pop();
        let err = svc.submit_order(edited, &Caller::Guest, Some(key)).await.unwrap_err();
        assert!(matches!(err, StorefrontError::IdempotencyConflict));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_view_authorization() {
        let (svc, _) = service();
        let alice = Caller::Customer(Uuid::new_v4());
        let bob = Caller::Customer(Uuid::new_v4());
        let order = svc.submit_order(fixtures::draft(), &alice, None).await.unwrap().order;

        assert!(svc.get_order(order.id, &alice).await.is_ok());
        assert!(svc.get_order(order.id, &admin()).await.is_ok());
        assert!(matches!(svc.get_order(order.id, &bob).await, Err(StorefrontError::Forbidden)));
        assert!(matches!(svc.get_order(order.id, &Caller::Guest).await, Err(StorefrontError::Unauthenticated)));
        assert!(matches!(svc.get_order(Uuid::new_v4(), &admin()).await, Err(StorefrontError::OrderNotFound)));

        let guest_order = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap().order;
        assert!(svc.get_order(guest_order.id, &bob).await.is_ok());
        assert!(svc.get_order(guest_order.id, &Caller::Guest).await.is_ok());
    }

    #[tokio::test]
    async fn test_listing_is_scoped_for_customers() {
        let (svc, _) = service();
        let alice_id = Uuid::new_v4();
        let bob_id = Uuid::new_v4();
        for caller in [Caller::Customer(alice_id), Caller::Customer(alice_id), Caller::Customer(bob_id), Caller::Guest] {
            svc.submit_order(fixtures::draft(), &caller, None).await.unwrap();
        }

        let everything = svc.list_orders(OrderQuery::default(), &admin()).await.unwrap();
        assert_eq!(everything.total, 4);

        let for_bob = svc.list_orders(OrderQuery { customer_id: Some(bob_id), ..Default::default() }, &admin()).await.unwrap();
        assert_eq!(for_bob.total, 1);

        let sneaky = OrderQuery { customer_id: Some(bob_id), ..Default::default() };
        let alice_view = svc.list_orders(sneaky, &Caller::Customer(alice_id)).await.unwrap();
        assert_eq!(alice_view.total, 2);
        assert!(alice_view.orders.iter().all(|o| o.owner_id == Some(alice_id)));

        assert!(matches!(svc.list_orders(OrderQuery::default(), &Caller::Guest).await, Err(StorefrontError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_listing_pagination_and_filters() {
        let (svc, _) = service();
        for _ in 0..5 {
            svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap();
        }
        let page = svc.list_orders(OrderQuery { page: Some(2), limit: Some(2), ..Default::default() }, &admin()).await.unwrap();
        assert_eq!((page.total, page.page, page.limit, page.total_pages), (5, 2, 2, 3));
        assert_eq!(page.orders.len(), 2);

        let processing = svc.list_orders(OrderQuery { status: Some(OrderStatus::Processing), ..Default::default() }, &admin()).await.unwrap();
        assert_eq!(processing.total, 0);

        let today = Utc::now().date_naive();
        let bad_range = OrderQuery { start_date: Some(today), end_date: today.pred_opt(), ..Default::default() };
        assert!(matches!(svc.list_orders(bad_range, &admin()).await, Err(StorefrontError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_update_flow() {
        let (svc, _) = service();
        let order = svc.submit_order(fixtures::draft(), &Caller::Guest, None).await.unwrap().order;
        let eta = (Utc::now() + Duration::days(4)).date_naive();

        let updated = svc
            .update_status(order.id, StatusUpdate { status: OrderStatus::Processing, expected_delivery_date: Some(eta) }, &admin())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(updated.expected_delivery_date, Some(eta));
        assert_eq!(updated.created_at, order.created_at);

        let delivered = StatusUpdate { status: OrderStatus::Delivered, expected_delivery_date: None };
        let updated = svc.update_status(order.id, delivered, &admin()).await.unwrap();
        assert_eq!(updated.expected_delivery_date, Some(eta));

        let cancel = StatusUpdate { status: OrderStatus::Cancelled, expected_delivery_date: None };
        let err = svc.update_status(order.id, cancel, &admin()).await.unwrap_err();
        assert!(matches!(err, StorefrontError::InvalidTransition { from: OrderStatus::Delivered, to: OrderStatus::Cancelled }));
        assert_eq!(svc.get_order(order.id, &admin()).await.unwrap().status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_checkout_retry_after_storage_failure() {
        use crate::domain::aggregates::{Cart, CartItem, MemoryCartStorage, PaymentMethod};
        use crate::domain::checkout::{CheckoutStep, CheckoutWizard, InformationForm, PaymentForm, StepInput};
        use crate::domain::pricing::ShippingOption;

        let (svc, store) = service();
        let mut cart = Cart::load(MemoryCartStorage::default());
        cart.add_item(CartItem { product_id: 1, name: "Desk Lamp".into(), unit_price: Money::from_cents(2000), image_ref: None, quantity: 2 });
        cart.add_item(CartItem { product_id: 2, name: "Bulb".into(), unit_price: Money::from_cents(1500), image_ref: None, quantity: 1 });

        let mut wizard = CheckoutWizard::new(&mut cart, Caller::Guest, svc.pricing().clone()).unwrap();
        let information = InformationForm { contact: fixtures::contact(), shipping_address: fixtures::address(), notes: None };
        wizard.advance(StepInput::Information(information)).unwrap();
        wizard.advance(StepInput::Shipping(ShippingOption::Standard)).unwrap();
        let payment = PaymentForm { payment_method: PaymentMethod::Paypal, billing_same_as_shipping: true, billing_address: None };
        wizard.advance(StepInput::Payment(payment)).unwrap();

        store.fail_item_insert_at(0);
        assert!(wizard.submit(&svc).await.is_err());
        assert_eq!(wizard.step(), CheckoutStep::Review);
        assert!(wizard.last_error().is_some());
        assert_eq!(store.order_count().await, 0);

        store.clear_faults();
        let order = wizard.submit(&svc).await.unwrap().clone();
        assert_eq!(order.totals.total, Money::from_cents(7385));
        assert_eq!(order.payment_method, PaymentMethod::Paypal);
        assert_eq!(wizard.step(), CheckoutStep::Confirmed);
        drop(wizard);
        assert!(cart.is_empty());
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_update_requires_admin() {
        let (svc, _) = service();
        let alice = Caller::Customer(Uuid::new_v4());
        let order = svc.submit_order(fixtures::draft(), &alice, None).await.unwrap().order;
        let update = StatusUpdate { status: OrderStatus::Cancelled, expected_delivery_date: None };
        assert!(matches!(svc.update_status(order.id, update.clone(), &alice).await, Err(StorefrontError::Forbidden)));
        assert!(matches!(svc.update_status(order.id, update.clone(), &Caller::Guest).await, Err(StorefrontError::Unauthenticated)));
        assert!(matches!(svc.update_status(Uuid::new_v4(), update, &admin()).await, Err(StorefrontError::OrderNotFound)));
    }
}
