//! Storefront order lifecycle
//!
//! Cart, checkout and order service for a storefront.
//!
//! ## Features
//! - Session cart with durable snapshots
//! - Multi-step checkout producing one atomic order submission
//! - Server-side pricing: flat-rate tax and threshold-based free shipping
//! - Guest and customer orders with owner-scoped access
//! - Admin status progression and customer-facing tracking

pub mod api;
pub mod config;
pub mod domain;
pub mod identity;
pub mod service;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{OrderError, OrderStatus};
use crate::domain::draft::FieldErrors;
use crate::store::StoreError;

pub use crate::config::Config;
pub use crate::domain::aggregates::{Order, OrderItem};
pub use crate::domain::draft::OrderDraft;
pub use crate::identity::Caller;
pub use crate::service::OrderService;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    #[error("authentication required")]
    Unauthenticated,

    #[error("access denied")]
    Forbidden,

    #[error("order not found")]
    OrderNotFound,

    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("idempotency key was already used for a different request")]
    IdempotencyConflict,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl StorefrontError {
    /// Whether the same request may succeed if simply sent again.
    pub fn is_retryable(&self) -> bool { matches!(self, Self::Storage(_)) }
}

impl From<OrderError> for StorefrontError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::Validation(FieldErrors::single("orderItems", e.to_string())),
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::DeliveryBeforeOrder { .. } => Self::Validation(FieldErrors::single("expectedDeliveryDate", e.to_string())),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
