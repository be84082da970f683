//! Application state shared across handlers.

use std::sync::Arc;

use crate::backend::BackendClient;
use crate::cart::{CartOptions, ReturnLink, TabRegistry, WhatsAppCheckout};
use crate::catalog::{CatalogCache, CatalogSource, ChangeFeed};
use crate::config::StorefrontConfig;
use crate::storage::StorageBackend;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// catalog cache, the backend client, and the open tab containers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    catalog: CatalogCache,
    backend: BackendClient,
    tabs: TabRegistry,
    feed: ChangeFeed,
}

impl AppState {
    /// Create the state with the backend client as catalog source.
    ///
    /// Must be called inside a tokio runtime: the catalog starts watching
    /// the change feed.
    #[must_use]
    pub fn new(config: StorefrontConfig, storage: Arc<dyn StorageBackend>) -> Self {
        let feed = ChangeFeed::new();
        let backend = BackendClient::new(&config.backend, feed.clone());
        let source: Arc<dyn CatalogSource> = Arc::new(backend.clone());
        Self::from_parts(config, source, backend, storage, feed)
    }

    /// Assemble the state from explicit parts (tests substitute the source).
    #[must_use]
    pub fn from_parts(
        config: StorefrontConfig,
        source: Arc<dyn CatalogSource>,
        backend: BackendClient,
        storage: Arc<dyn StorageBackend>,
        feed: ChangeFeed,
    ) -> Self {
        let catalog = CatalogCache::new(source, config.catalog);
        // The watcher ends when the feed's last sender is dropped.
        drop(catalog.watch_changes(&feed));

        let checkout = WhatsAppCheckout::new(&config.whatsapp_phone, Arc::new(ReturnLink));
        let tabs = TabRegistry::new(
            storage,
            checkout,
            CartOptions {
                persist_debounce: config.cart_persist_debounce,
            },
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                catalog,
                backend,
                tabs,
                feed,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the catalog cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }

    /// Get a reference to the hosted backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    /// Get a reference to the open tab containers.
    #[must_use]
    pub fn tabs(&self) -> &TabRegistry {
        &self.inner.tabs
    }

    /// Get a reference to the row-change feed.
    #[must_use]
    pub fn feed(&self) -> &ChangeFeed {
        &self.inner.feed
    }
}
