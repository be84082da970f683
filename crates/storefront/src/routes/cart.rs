//! Cart route handlers.
//!
//! Each request addresses the caller's tab container (see [`Tab`]); the
//! response carries the cart after the action plus the notifications the
//! action emitted.

use axum::{Json, extract::Path};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use vitrine_core::{CartItem, ProductId, ProductInput};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::Tab;
use crate::notify::Notification;
use crate::storage::Namespace;

/// One cart line with its subtotal.
#[derive(Debug, Serialize)]
pub struct CartLineView {
    #[serde(flatten)]
    pub item: CartItem,
    pub line_total: String,
}

/// Cart display data.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartLineView>,
    pub total_items: u64,
    pub total: String,
    pub namespace: Namespace,
    pub last_updated: Option<DateTime<Utc>>,
    pub notifications: Vec<Notification>,
}

impl CartView {
    fn of(tab: &mut Tab) -> Self {
        let state = tab.container.snapshot();
        let items = state
            .cart
            .iter()
            .map(|item| CartLineView {
                line_total: item.line_total().display(),
                item: item.clone(),
            })
            .collect();

        Self {
            items,
            total_items: state.total_items(),
            total: state.cart_total().display(),
            namespace: state.namespace,
            last_updated: state.last_updated,
            notifications: tab.drain(),
        }
    }
}

/// Body of `POST /api/cart/items`.
#[derive(Debug, Deserialize)]
pub struct AddItem {
    pub product: ProductInput,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

/// Body of `PATCH /api/cart/items/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateQuantity {
    pub quantity: i64,
}

/// Checkout result.
#[derive(Debug, Serialize)]
pub struct CheckoutView {
    pub url: String,
    pub notifications: Vec<Notification>,
}

pub async fn show(mut tab: Tab) -> Json<CartView> {
    Json(CartView::of(&mut tab))
}

pub async fn add(mut tab: Tab, Json(body): Json<AddItem>) -> Json<CartView> {
    let product_id = body.product.id.clone().unwrap_or_default();
    add_breadcrumb("cart", "Added to cart", Some(&[("product_id", product_id.as_str())]));

    tab.container.add_to_cart(body.product, body.quantity);
    Json(CartView::of(&mut tab))
}

pub async fn update(
    mut tab: Tab,
    Path(id): Path<String>,
    Json(body): Json<UpdateQuantity>,
) -> Json<CartView> {
    tab.container
        .update_quantity(&ProductId::new(id), body.quantity);
    Json(CartView::of(&mut tab))
}

pub async fn remove(mut tab: Tab, Path(id): Path<String>) -> Json<CartView> {
    tab.container.remove_from_cart(&ProductId::new(id));
    Json(CartView::of(&mut tab))
}

pub async fn clear(mut tab: Tab) -> Json<CartView> {
    tab.container.clear_cart();
    Json(CartView::of(&mut tab))
}

/// Build the WhatsApp order link for the cart.
///
/// An empty cart answers 422 without any handoff.
#[instrument(skip(tab))]
pub async fn checkout(mut tab: Tab) -> Result<Json<CheckoutView>> {
    add_breadcrumb("cart", "Checkout via WhatsApp", None);

    let url = tab.container.send_cart_to_whatsapp().await?;
    Ok(Json(CheckoutView {
        url,
        notifications: tab.drain(),
    }))
}
