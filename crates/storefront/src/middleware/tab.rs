//! Tab extractor for cart and favorites routes.
//!
//! Requests address a server-hosted container by `X-Tab-Id` within the
//! device scope `X-Device-Id`; `X-User-Id` selects the signed-in namespace.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::Span;
use vitrine_core::UserId;

use crate::cart::TabSession;
use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const TAB_ID_HEADER: &str = "x-tab-id";
pub const USER_ID_HEADER: &str = "x-user-id";

const MAX_ID_LEN: usize = 128;

/// Extractor that opens the caller's tab container.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(mut tab: Tab) -> impl IntoResponse {
///     tab.container.clear_cart();
///     Json(tab.drain())
/// }
/// ```
pub struct Tab(pub TabSession);

impl std::ops::Deref for Tab {
    type Target = TabSession;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for Tab {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl FromRequestParts<AppState> for Tab {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let device = required_header(parts, DEVICE_ID_HEADER)?;
        let tab = required_header(parts, TAB_ID_HEADER)?;
        let user = optional_header(parts, USER_ID_HEADER)?.map(UserId::new);

        Span::current().record("tab_id", tab.as_str());
        if let Some(user) = &user {
            set_sentry_user(user);
        }

        Ok(Self(state.tabs().open(&device, &tab, user).await))
    }
}

fn required_header(parts: &Parts, name: &str) -> Result<String, AppError> {
    optional_header(parts, name)?
        .ok_or_else(|| AppError::BadRequest(format!("missing {name} header")))
}

fn optional_header(parts: &Parts, name: &str) -> Result<Option<String>, AppError> {
    let Some(value) = parts.headers.get(name) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("invalid {name} header")))?
        .trim();

    if value.is_empty() {
        return Ok(None);
    }
    if value.len() > MAX_ID_LEN || value.contains('/') {
        return Err(AppError::BadRequest(format!("invalid {name} header")));
    }
    Ok(Some(value.to_string()))
}
