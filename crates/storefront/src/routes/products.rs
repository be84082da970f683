//! Catalog route handlers.
//!
//! Every listing is derived from the cached catalog snapshot; only a cache
//! miss reaches the hosted backend.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::instrument;
use vitrine_core::{Product, ProductId};

use crate::error::{AppError, Result};
use crate::state::AppState;

const PUBLIC_SETTINGS_RPC: &str = "get_public_settings";

/// Query parameters for the full listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Query parameters for search.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Query parameters for cache invalidation.
#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub pattern: Option<String>,
}

/// Every visible product; `?refresh=true` bypasses the cache.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Product>>> {
    let products = state.catalog().get_all_products(query.refresh).await?;
    // Keep the snapshot warm for the next visitor.
    drop(state.catalog().prefetch_products().await);
    Ok(Json(products.to_vec()))
}

pub async fn featured(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().get_featured_products().await?))
}

pub async fn new_arrivals(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().get_new_products().await?))
}

pub async fn offers(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().get_offers_products().await?))
}

pub async fn out_of_stock(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().get_out_of_stock_products().await?))
}

pub async fn by_brand(
    State(state): State<AppState>,
    Path(brand): Path<String>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().get_brand_products(&brand).await?))
}

#[instrument(skip(state))]
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(state.catalog().search_products(&query.q).await?))
}

/// One product; 404 when it is not in the visible catalog.
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    let id = ProductId::new(id);
    state
        .catalog()
        .get_product(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}

pub async fn related(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Product>>> {
    Ok(Json(
        state
            .catalog()
            .get_related_products(&ProductId::new(id))
            .await?,
    ))
}

pub async fn brands(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.catalog().get_brands().await?))
}

/// Drop cached snapshots, all or those whose key contains `pattern`.
#[instrument(skip(state))]
pub async fn invalidate(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> StatusCode {
    let pattern = query.pattern.as_deref().filter(|p| !p.is_empty());
    state.catalog().invalidate_cache(pattern).await;
    StatusCode::NO_CONTENT
}

/// Settings the backend exposes to anonymous visitors.
pub async fn public_settings(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let settings: serde_json::Value = state
        .backend()
        .rpc(PUBLIC_SETTINGS_RPC, &serde_json::json!({}))
        .await?;
    Ok(Json(settings))
}
