//! Admin route handlers.
//!
//! Thin pass-through to the hosted backend with the caller's bearer token.
//! Product updates are published on the change feed, so the catalog cache
//! refetches on the next read.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{info, instrument};
use vitrine_core::{Product, ProductId};

use crate::backend::{ProductPatch, SettingsPatch, StoreSettings};
use crate::error::{AppError, Result};
use crate::middleware::RequireBearer;
use crate::state::AppState;

pub async fn settings(
    State(state): State<AppState>,
    RequireBearer(token): RequireBearer,
) -> Result<Json<StoreSettings>> {
    Ok(Json(state.backend().fetch_settings(&token).await?))
}

#[instrument(skip(state, token, patch))]
pub async fn update_settings(
    State(state): State<AppState>,
    RequireBearer(token): RequireBearer,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<StoreSettings>> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("empty settings patch".to_string()));
    }

    let settings = state.backend().update_settings(&token, &patch).await?;
    info!("Store settings updated");
    Ok(Json(settings))
}

#[instrument(skip(state, token, patch))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireBearer(token): RequireBearer,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> Result<Json<Product>> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("empty product patch".to_string()));
    }

    let id = ProductId::new(id);
    let product = state.backend().update_product(&token, &id, &patch).await?;
    info!(product_id = %id, "Product updated");
    Ok(Json(product))
}
