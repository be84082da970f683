//! Cart and favorites state container.
//!
//! # Architecture
//!
//! - [`reducer`] holds the pure state machine ([`AppState`], [`Action`]).
//! - [`CartContainer`] owns one context's state in a `watch` channel, loads
//!   it from [`NamespacedStorage`](crate::storage::NamespacedStorage),
//!   writes changes back after a debounce window, and applies changes made
//!   by other contexts sharing the same storage.
//! - [`checkout`] turns the cart into a WhatsApp order link.
//! - [`TabRegistry`] hosts one container per browser tab for the HTTP layer.
//!
//! Write-back is skipped until the initial load finishes, so a freshly
//! opened context never overwrites stored data with its empty defaults.

pub mod checkout;
mod container;
mod persist;
pub mod reducer;
mod registry;

pub use checkout::{CheckoutError, Handoff, ReturnLink, WhatsAppCheckout, order_message};
pub use container::{CartContainer, CartOptions};
pub use reducer::{Action, AppState, reduce};
pub use registry::{TabRegistry, TabSession};
