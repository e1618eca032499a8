use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;

/// Header set by the upstream auth layer with the authenticated user id
pub const OWNER_HEADER: &str = "x-owner-id";

/// Identity of the caller; every `/api` resource is scoped by it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthenticated)?;
        Ok(OwnerId(owner.to_string()))
    }
}
