//! Postgres order store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use super::{OrderFilter, OrderStore, OrderTx, PageRequest, StoreError, UniqueKey};
use crate::domain::aggregates::{Order, OrderItem, OrderStatus};
use crate::domain::draft::{Address, ContactInfo};
use crate::domain::pricing::Totals;
use crate::domain::value_objects::{Money, OrderNumber};

const INSERT_ORDER_SQL: &str = "INSERT INTO orders (
    id, owner_id, order_number, idempotency_key,
    first_name, last_name, email, phone,
    shipping_address, shipping_city, shipping_state, shipping_zip, shipping_country,
    billing_address, billing_city, billing_state, billing_zip, billing_country,
    shipping_method, notes, status, subtotal, shipping, tax, total,
    payment_method, payment_status, expected_delivery_date, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30)";

const INSERT_ITEM_SQL: &str = "INSERT INTO order_items (id, order_id, position, product_id, name, image_ref, unit_price, quantity, line_total)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

const UPDATE_STATUS_SQL: &str = "UPDATE orders
SET status = $2, expected_delivery_date = COALESCE($3, expected_delivery_date), updated_at = $4
WHERE id = $1 AND status NOT IN ('delivered', 'cancelled')
RETURNING *";

#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn items_for(&self, ids: Vec<Uuid>) -> Result<HashMap<Uuid, Vec<OrderItem>>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        let mut grouped: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let item = row.into_item()?;
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let mut items = self.items_for(rows.iter().map(|r| r.id).collect()).await?;
        rows.into_iter().map(|row| {
            let lines = items.remove(&row.id).unwrap_or_default();
            row.into_order(lines)
        }).collect()
    }
}

struct PgOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTx for PgOrderTx {
    async fn insert_header(&mut self, o: &Order) -> Result<(), StoreError> {
        sqlx::query(INSERT_ORDER_SQL)
            .bind(o.id).bind(o.owner_id).bind(o.order_number.as_str()).bind(o.idempotency_key)
            .bind(&o.contact.first_name).bind(&o.contact.last_name).bind(&o.contact.email).bind(&o.contact.phone)
            .bind(&o.shipping_address.address).bind(&o.shipping_address.city).bind(&o.shipping_address.state)
            .bind(&o.shipping_address.zip).bind(&o.shipping_address.country)
            .bind(&o.billing_address.address).bind(&o.billing_address.city).bind(&o.billing_address.state)
            .bind(&o.billing_address.zip).bind(&o.billing_address.country)
            .bind(o.shipping_option.as_str()).bind(&o.notes).bind(o.status.as_str())
            .bind(o.totals.subtotal.amount()).bind(o.totals.shipping.amount()).bind(o.totals.tax.amount()).bind(o.totals.total.amount())
            .bind(o.payment_method.as_str()).bind(o.payment_status.as_str()).bind(o.expected_delivery_date)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn insert_item(&mut self, item: &OrderItem, position: u32) -> Result<(), StoreError> {
        let quantity = i32::try_from(item.quantity).map_err(|e| StoreError::Corrupt(format!("quantity {}: {e}", item.quantity)))?;
        let position = i32::try_from(position).map_err(|e| StoreError::Corrupt(format!("position {position}: {e}")))?;
        sqlx::query(INSERT_ITEM_SQL)
            .bind(item.id).bind(item.order_id).bind(position).bind(item.product_id).bind(&item.name).bind(&item.image_ref)
            .bind(item.unit_price.amount()).bind(quantity).bind(item.line_total.amount())
            .execute(&mut *self.tx)
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(map_write_error)
    }
}

fn map_write_error(e: sqlx::Error) -> StoreError {
    if let Some(db) = e.as_database_error() {
        if db.is_unique_violation() {
            match db.constraint() {
                Some("orders_order_number_key") => return StoreError::Duplicate(UniqueKey::OrderNumber),
                Some("orders_idempotency_key_key") => return StoreError::Duplicate(UniqueKey::IdempotencyKey),
                _ => {}
            }
        }
    }
    StoreError::Database(e)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(owner) = filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND created_at >= ").push_bind(start_of_day(start));
    }
    if let Some(next_day) = filter.end_date.and_then(|d| d.succ_opt()) {
        qb.push(" AND created_at < ").push_bind(start_of_day(next_day));
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTx>, StoreError> {
        Ok(Box::new(PgOrderTx { tx: self.pool.begin().await? }))
    }

    async fn find_order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE idempotency_key = $1").bind(key).fetch_optional(&self.pool).await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter, page: PageRequest) -> Result<(Vec<Order>, u64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM orders");
        push_filters(&mut select, filter);
        select.push(" ORDER BY created_at DESC, id DESC LIMIT ").push_bind(i64::from(page.limit)).push(" OFFSET ").push_bind(offset);
        let rows = select.build_query_as::<OrderRow>().fetch_all(&self.pool).await?;

        Ok((self.hydrate(rows).await?, u64::try_from(total).unwrap_or_default()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        expected_delivery_date: Option<NaiveDate>,
        updated_at: DateTime<Utc>,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query_as::<_, OrderRow>(UPDATE_STATUS_SQL)
            .bind(id).bind(status.as_str()).bind(expected_delivery_date).bind(updated_at)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    order_number: String,
    idempotency_key: Option<Uuid>,
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    shipping_address: String,
    shipping_city: String,
    shipping_state: String,
    shipping_zip: String,
    shipping_country: String,
    billing_address: String,
    billing_city: String,
    billing_state: String,
    billing_zip: String,
    billing_country: String,
    shipping_method: String,
    notes: Option<String>,
    status: String,
    subtotal: Decimal,
    shipping: Decimal,
    tax: Decimal,
    total: Decimal,
    payment_method: String,
    payment_status: String,
    expected_delivery_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order, StoreError> {
        Ok(Order {
            id: self.id,
            owner_id: self.owner_id,
            order_number: OrderNumber::parse(self.order_number).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            contact: ContactInfo { first_name: self.first_name, last_name: self.last_name, email: self.email, phone: self.phone },
            shipping_address: Address {
                address: self.shipping_address,
                city: self.shipping_city,
                state: self.shipping_state,
                zip: self.shipping_zip,
                country: self.shipping_country,
            },
            billing_address: Address {
                address: self.billing_address,
                city: self.billing_city,
                state: self.billing_state,
                zip: self.billing_zip,
                country: self.billing_country,
            },
            shipping_option: self.shipping_method.parse().map_err(StoreError::Corrupt)?,
            notes: self.notes,
            status: self.status.parse().map_err(StoreError::Corrupt)?,
            totals: Totals {
                subtotal: Money::from(self.subtotal),
                shipping: Money::from(self.shipping),
                tax: Money::from(self.tax),
                total: Money::from(self.total),
            },
            payment_method: self.payment_method.parse().map_err(StoreError::Corrupt)?,
            payment_status: self.payment_status.parse().map_err(StoreError::Corrupt)?,
            expected_delivery_date: self.expected_delivery_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
            idempotency_key: self.idempotency_key,
            events: vec![],
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: i64,
    name: String,
    image_ref: Option<String>,
    unit_price: Decimal,
    quantity: i32,
    line_total: Decimal,
}

impl ItemRow {
    fn into_item(self) -> Result<OrderItem, StoreError> {
        Ok(OrderItem {
            id: self.id,
            order_id: self.order_id,
            product_id: self.product_id,
            name: self.name,
            image_ref: self.image_ref,
            unit_price: Money::from(self.unit_price),
            quantity: u32::try_from(self.quantity).map_err(|e| StoreError::Corrupt(format!("quantity {}: {e}", self.quantity)))?,
            line_total: Money::from(self.line_total),
        })
    }
}
