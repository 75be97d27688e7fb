//! HTTP error responses.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::domain::draft::FieldErrors;
use crate::store::StoreError;
use crate::StorefrontError;

#[derive(Debug)]
pub enum ApiError {
    Storefront(StorefrontError),
    /// The request could not be decoded at all.
    Malformed(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a FieldErrors>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Storefront(e) => match e {
                StorefrontError::Validation(_) => StatusCode::BAD_REQUEST,
                StorefrontError::Unauthenticated => StatusCode::UNAUTHORIZED,
                StorefrontError::Forbidden => StatusCode::FORBIDDEN,
                StorefrontError::OrderNotFound => StatusCode::NOT_FOUND,
                StorefrontError::InvalidTransition { .. } | StorefrontError::IdempotencyConflict => StatusCode::CONFLICT,
                StorefrontError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_request",
            Self::Storefront(e) => match e {
                StorefrontError::Validation(_) => "validation_failed",
                StorefrontError::Unauthenticated => "unauthenticated",
                StorefrontError::Forbidden => "forbidden",
                StorefrontError::OrderNotFound => "order_not_found",
                StorefrontError::InvalidTransition { .. } => "invalid_transition",
                StorefrontError::IdempotencyConflict => "idempotency_conflict",
                StorefrontError::Storage(_) => "temporarily_unavailable",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, fields, retryable) = match &self {
            Self::Malformed(detail) => {
                warn!(%detail, "rejected malformed request");
                (detail.clone(), None, false)
            }
            Self::Storefront(StorefrontError::Storage(source)) => {
                error!(error = %source, "order storage failure");
                ("Order storage is temporarily unavailable, please try again".to_string(), None, true)
            }
            Self::Storefront(StorefrontError::Validation(fields)) => ("Request validation failed".to_string(), Some(fields), false),
            Self::Storefront(e) => (e.to_string(), None, false),
        };
        let body = ErrorBody { error: self.code(), message, retryable, fields };
        (status, Json(body)).into_response()
    }
}

impl From<StorefrontError> for ApiError {
    fn from(e: StorefrontError) -> Self { Self::Storefront(e) }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self { Self::Storefront(e.into()) }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self { Self::Malformed(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self { Self::Malformed(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self { Self::Malformed(rejection.body_text()) }
}
