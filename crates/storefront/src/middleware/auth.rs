//! Bearer token extractor for admin routes.
//!
//! The storefront does not validate tokens itself: it forwards them to the
//! hosted backend, whose row-level security decides what the caller may do.

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use secrecy::SecretString;

use crate::error::AppError;

/// Extractor that requires an `Authorization: Bearer <token>` header.
///
/// # Example
///
/// ```rust,ignore
/// async fn admin_handler(RequireBearer(token): RequireBearer) -> impl IntoResponse {
///     backend.fetch_settings(&token).await
/// }
/// ```
pub struct RequireBearer(pub SecretString);

impl<S> FromRequestParts<S> for RequireBearer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("bearer token required".to_string()))?;

        Ok(Self(SecretString::from(token.to_string())))
    }
}
