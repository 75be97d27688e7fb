//! HTTP surface.

use axum::{
    routing::{get, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::identity::IdentityProvider;
use crate::service::OrderService;

pub mod auth;
pub mod error;
pub mod orders;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OrderService>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(service: OrderService, identity: impl IdentityProvider + 'static) -> Self {
        Self { service: Arc::new(service), identity: Arc::new(identity) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"})) }))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/status", put(orders::update_status))
        .route("/orders/:id/tracking", get(orders::get_tracking))
        .route("/customer/orders", get(orders::customer_orders))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
