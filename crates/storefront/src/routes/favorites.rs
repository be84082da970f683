//! Favorites route handlers.

use axum::{Json, extract::Path};
use serde::Serialize;
use vitrine_core::ProductId;

use crate::middleware::Tab;
use crate::notify::Notification;

#[derive(Debug, Serialize)]
pub struct FavoritesView {
    pub favorites: Vec<ProductId>,
    pub count: usize,
    /// Whether the toggled product is now a favorite (toggle only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    pub notifications: Vec<Notification>,
}

impl FavoritesView {
    fn of(tab: &mut Tab, is_favorite: Option<bool>) -> Self {
        let favorites = tab.container.snapshot().favorites;
        Self {
            count: favorites.len(),
            favorites,
            is_favorite,
            notifications: tab.drain(),
        }
    }
}

pub async fn show(mut tab: Tab) -> Json<FavoritesView> {
    Json(FavoritesView::of(&mut tab, None))
}

pub async fn toggle(mut tab: Tab, Path(id): Path<String>) -> Json<FavoritesView> {
    let is_favorite = tab.container.toggle_favorite(&ProductId::new(id));
    Json(FavoritesView::of(&mut tab, Some(is_favorite)))
}
