//! Cart and favorites state machine.
//!
//! [`reduce`] is pure: it applies one [`Action`] to an [`AppState`] and
//! reports whether anything changed. The container serializes calls through
//! its `watch` channel, so transitions never interleave.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use vitrine_core::{CartItem, Price, ProductId};

use crate::storage::Namespace;

/// Everything the container owns for one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppState {
    pub cart: Vec<CartItem>,
    pub favorites: Vec<ProductId>,
    pub is_loading: bool,
    /// Set once the initial load for `namespace` finished, successfully or not.
    pub data_loaded: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub namespace: Namespace,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            cart: Vec::new(),
            favorites: Vec::new(),
            is_loading: true,
            data_loaded: false,
            last_updated: None,
            namespace: Namespace::Guest,
        }
    }
}

impl AppState {
    /// Sum of quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.cart.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of unit price times quantity.
    #[must_use]
    pub fn cart_total(&self) -> Price {
        self.cart.iter().map(CartItem::line_total).sum()
    }

    #[must_use]
    pub fn is_favorite(&self, id: &ProductId) -> bool {
        self.favorites.contains(id)
    }

    /// Whether write-back is allowed for this state.
    #[must_use]
    pub const fn is_persistable(&self) -> bool {
        self.data_loaded && !self.is_loading
    }
}

/// A state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Replace the cart (initial load, cross-tab sync).
    SetCart(Vec<CartItem>),
    /// Replace favorites (initial load, cross-tab sync).
    SetFavorites(Vec<ProductId>),
    /// Add `item.quantity` units of `item`, merging with an existing line.
    AddToCart(CartItem),
    RemoveFromCart(ProductId),
    /// Set a line's quantity exactly; zero or less removes it.
    UpdateQuantity { id: ProductId, quantity: i64 },
    ClearCart,
    ToggleFavorite(ProductId),
    /// Start loading `namespace`: drops current collections.
    BeginLoad(Namespace),
    /// Loading finished.
    MarkLoaded,
}

/// Apply `action` to `state`. Returns whether the state changed.
///
/// Every change to the collections stamps `last_updated` with `now`.
pub fn reduce(state: &mut AppState, action: Action, now: DateTime<Utc>) -> bool {
    let changed = match action {
        Action::SetCart(items) => replace(&mut state.cart, sanitize_cart(items)),
        Action::SetFavorites(ids) => replace(&mut state.favorites, sanitize_favorites(ids)),
        Action::AddToCart(item) => {
            let quantity = item.quantity.max(1);
            if let Some(line) = state.cart.iter_mut().find(|line| line.id == item.id) {
                line.quantity = line.quantity.saturating_add(quantity);
            } else {
                state.cart.push(CartItem { quantity, ..item });
            }
            true
        }
        Action::RemoveFromCart(id) => remove_line(&mut state.cart, &id),
        Action::UpdateQuantity { id, quantity } => {
            if quantity <= 0 {
                remove_line(&mut state.cart, &id)
            } else {
                let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
                match state.cart.iter_mut().find(|line| line.id == id) {
                    Some(line) if line.quantity != quantity => {
                        line.quantity = quantity;
                        true
                    }
                    _ => false,
                }
            }
        }
        Action::ClearCart => {
            let had_items = !state.cart.is_empty();
            state.cart.clear();
            had_items
        }
        Action::ToggleFavorite(id) => {
            if let Some(index) = state.favorites.iter().position(|f| *f == id) {
                state.favorites.remove(index);
            } else {
                state.favorites.push(id);
            }
            true
        }
        Action::BeginLoad(namespace) => {
            state.cart.clear();
            state.favorites.clear();
            state.is_loading = true;
            state.data_loaded = false;
            state.namespace = namespace;
            return true;
        }
        Action::MarkLoaded => {
            let changed = state.is_loading || !state.data_loaded;
            state.is_loading = false;
            state.data_loaded = true;
            return changed;
        }
    };

    if changed {
        state.last_updated = Some(now);
    }
    changed
}

fn replace<T: PartialEq>(slot: &mut Vec<T>, next: Vec<T>) -> bool {
    if *slot == next {
        return false;
    }
    *slot = next;
    true
}

fn remove_line(cart: &mut Vec<CartItem>, id: &ProductId) -> bool {
    let before = cart.len();
    cart.retain(|line| &line.id != id);
    cart.len() != before
}

/// Drop zero-quantity lines and merge duplicate ids (quantities summed),
/// keeping first-seen order.
#[must_use]
pub fn sanitize_cart(items: Vec<CartItem>) -> Vec<CartItem> {
    let mut out: Vec<CartItem> = Vec::with_capacity(items.len());
    for item in items.into_iter().filter(|item| item.quantity > 0) {
        if let Some(line) = out.iter_mut().find(|line| line.id == item.id) {
            line.quantity = line.quantity.saturating_add(item.quantity);
        } else {
            out.push(item);
        }
    }
    out
}

/// Collapse duplicate ids, keeping first-seen order.
#[must_use]
pub fn sanitize_favorites(ids: Vec<ProductId>) -> Vec<ProductId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
