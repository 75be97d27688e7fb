//! Bearer identity extraction.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::debug;

use super::{error::ApiError, AppState};
use crate::identity::Caller;
use crate::StorefrontError;

/// A request without an `Authorization` header is a guest. A header that is
/// present but malformed, unknown or expired is rejected, never downgraded.
#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Caller::Guest);
        }
        let Some(token) = bearer_token(&parts.headers) else {
            return Err(StorefrontError::Unauthenticated.into());
        };
        match state.identity.resolve(token).await? {
            Some(caller) => Ok(caller),
            None => {
                debug!("rejected unknown or expired bearer token");
                Err(StorefrontError::Unauthenticated.into())
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}
