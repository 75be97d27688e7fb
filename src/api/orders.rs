//! Order handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::{error::ApiError, AppState};
use crate::domain::draft::{FieldErrors, OrderDraft};
use crate::domain::tracking::TrackingView;
use crate::identity::Caller;
use crate::service::{require_admin, OrderPage, OrderQuery, StatusUpdate};
use crate::{Order, StorefrontError};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    /// `None` for guest orders.
    pub id: Option<Uuid>,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderResponse {
    #[serde(flatten)]
    pub order: Order,
    pub customer: CustomerSummary,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let customer = CustomerSummary { id: order.owner_id, name: order.contact.full_name(), email: order.contact.email.clone() };
        Self { order, customer }
    }
}

/// `201` for a new order, `200` when the idempotency key replays an earlier one.
pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    body: Result<Json<OrderDraft>, JsonRejection>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let Json(draft) = body?;
    let key = idempotency_key(&headers)?;
    let submission = state.service.submit_order(draft, &caller, key).await?;
    let status = if submission.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(submission.order)))
}

pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let Path(id) = id?;
    let order = state.service.get_order(id, &caller).await?;
    Ok(Json(order.into()))
}

pub async fn get_tracking(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<TrackingView>, ApiError> {
    let Path(id) = id?;
    let order = state.service.get_order(id, &caller).await?;
    Ok(Json(TrackingView::from_order(&order)))
}

pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    require_admin(&caller)?;
    let Query(query) = query?;
    Ok(Json(state.service.list_orders(query, &caller).await?))
}

pub async fn customer_orders(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<OrderQuery>, QueryRejection>,
) -> Result<Json<OrderPage>, ApiError> {
    match caller {
        Caller::Customer(_) => {}
        Caller::Admin(_) => return Err(StorefrontError::Forbidden.into()),
        Caller::Guest => return Err(StorefrontError::Unauthenticated.into()),
    }
    let Query(query) = query?;
    Ok(Json(state.service.list_orders(query, &caller).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    require_admin(&caller)?;
    let Path(id) = id?;
    let Json(update) = body?;
    Ok(Json(state.service.update_status(id, update, &caller).await?))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };
    match value.to_str().ok().and_then(|v| Uuid::parse_str(v.trim()).ok()) {
        Some(key) => Ok(Some(key)),
        None => Err(StorefrontError::Validation(FieldErrors::single("Idempotency-Key", "must be a UUID")).into()),
    }
}
