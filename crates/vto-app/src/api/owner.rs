use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use crate::error::ApiError;
use crate::storage::is_safe_component;

pub const OWNER_HEADER: &str = "x-owner-id";

/// Caller identity taken from the `X-Owner-Id` header.
///
/// Whoever sits in front of the service is trusted to set it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for OwnerId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing X-Owner-Id header".into()))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("X-Owner-Id is not valid text".into()))?
            .trim();

        if !is_safe_component(value) {
            return Err(ApiError::Unauthorized(format!("'{}' is not a valid owner id", value)));
        }

        Ok(Self(value.to_string()))
    }
}
