//! Debounced write-back of cart and favorites.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use vitrine_core::{CartItem, ProductId};

use super::reducer::AppState;
use crate::storage::{Namespace, NamespacedStorage};

/// What storage is known to hold for the active namespace: the last values
/// loaded, written, or received from another context.
#[derive(Debug, Clone, Default)]
pub(crate) struct Baseline {
    pub(crate) namespace: Namespace,
    pub(crate) cart: Vec<CartItem>,
    pub(crate) favorites: Vec<ProductId>,
}

/// Writes the collections of a state that differ from the baseline.
#[derive(Clone)]
pub(crate) struct Writer {
    storage: Arc<NamespacedStorage>,
    baseline: Arc<Mutex<Baseline>>,
}

impl Writer {
    pub(crate) const fn new(storage: Arc<NamespacedStorage>, baseline: Arc<Mutex<Baseline>>) -> Self {
        Self { storage, baseline }
    }

    #[instrument(skip_all, fields(namespace = %state.namespace))]
    pub(crate) async fn write(&self, state: &AppState) {
        if !state.is_persistable() {
            debug!("Skipping write-back while loading");
            return;
        }

        let (cart_dirty, favorites_dirty) = {
            let baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
            if baseline.namespace != state.namespace {
                debug!("Skipping write-back for a namespace no longer active");
                return;
            }
            (
                baseline.cart != state.cart,
                baseline.favorites != state.favorites,
            )
        };

        if cart_dirty {
            match self.storage.set_cart_in(&state.namespace, &state.cart).await {
                Ok(()) => self.record(state, |b| b.cart.clone_from(&state.cart)),
                Err(e) => warn!(error = %e, "Failed to persist cart"),
            }
        }

        if favorites_dirty {
            match self
                .storage
                .set_favorites_in(&state.namespace, &state.favorites)
                .await
            {
                Ok(()) => self.record(state, |b| b.favorites.clone_from(&state.favorites)),
                Err(e) => warn!(error = %e, "Failed to persist favorites"),
            }
        }
    }

    fn record(&self, state: &AppState, update: impl FnOnce(&mut Baseline)) {
        let mut baseline = self.baseline.lock().unwrap_or_else(PoisonError::into_inner);
        if baseline.namespace == state.namespace {
            update(&mut baseline);
        }
    }
}

/// Write the latest state once it has been quiet for `debounce`.
///
/// Every change restarts the timer, so a burst of changes produces a single
/// write of the final state. Ends when the state sender is dropped.
pub(crate) async fn run(mut state: watch::Receiver<AppState>, writer: Writer, debounce: Duration) {
    loop {
        if state.changed().await.is_err() {
            return;
        }

        loop {
            tokio::select! {
                () = tokio::time::sleep(debounce) => break,
                changed = state.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let snapshot = state.borrow_and_update().clone();
        writer.write(&snapshot).await;
    }
}
