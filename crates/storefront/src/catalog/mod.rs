//! Client cache store for the product catalog.
//!
//! # Architecture
//!
//! - [`CatalogSource`] is the remote fetch (the backend client in
//!   production, fakes in tests).
//! - [`CatalogCache`] keeps one TTL-bound snapshot per cache key in a `moka`
//!   cache and coalesces concurrent misses: while a fetch for a key is in
//!   flight, every other caller joins it instead of starting another.
//! - [`views`] derives the storefront sections from the snapshot without
//!   further network access.
//! - [`ChangeFeed`] carries row changes; [`CatalogCache::watch_changes`]
//!   drops product snapshots when a `products` row changes.
//!
//! Freshness is judged against `tokio::time::Instant`, so TTL behaviour
//! follows the runtime clock. The `moka` TTL only bounds memory.

mod feed;
pub mod views;

pub use feed::{ChangeFeed, ChangeKind, PRODUCTS_TABLE, RowChange};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use moka::future::Cache;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use vitrine_core::{Product, ProductId};

/// Cache key of the full visible catalog.
pub const ALL_PRODUCTS_KEY: &str = "products:all";

/// Errors surfaced by the catalog cache.
///
/// Cloneable because every caller joined to a failed fetch receives the
/// same error.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// The source failed.
    #[error("Catalog fetch failed: {0}")]
    Source(String),

    /// The source did not answer in time.
    #[error("Catalog fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Remote catalog fetch.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every visible, active product.
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError>;
}

/// Cache timing.
#[derive(Debug, Clone, Copy)]
pub struct CatalogOptions {
    /// How long a snapshot is served without refetching.
    pub ttl: Duration,
    /// Snapshot age after which [`CatalogCache::prefetch_products`] refreshes.
    pub prefetch_after: Duration,
    /// Upper bound on one remote fetch.
    pub fetch_timeout: Duration,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            prefetch_after: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// A timestamped product list.
#[derive(Debug)]
pub struct CachedSnapshot {
    products: Arc<Vec<Product>>,
    fetched_at: Instant,
    ttl: Duration,
}

impl CachedSnapshot {
    #[must_use]
    pub const fn products(&self) -> &Arc<Vec<Product>> {
        &self.products
    }

    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Valid while younger than its TTL.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.age() < self.ttl
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<CachedSnapshot>, CatalogError>>>;

/// TTL cache over a [`CatalogSource`] with request coalescing.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct CatalogCache {
    inner: Arc<CatalogCacheInner>,
}

struct CatalogCacheInner {
    source: Arc<dyn CatalogSource>,
    entries: Cache<String, Arc<CachedSnapshot>>,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
    options: CatalogOptions,
}

impl CatalogCache {
    /// Create an empty cache over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn CatalogSource>, options: CatalogOptions) -> Self {
        let entries = Cache::builder()
            .max_capacity(64)
            .time_to_live(options.ttl)
            .build();

        Self {
            inner: Arc::new(CatalogCacheInner {
                source,
                entries,
                in_flight: Mutex::new(HashMap::new()),
                options,
            }),
        }
    }

    #[must_use]
    pub fn options(&self) -> CatalogOptions {
        self.inner.options
    }

    /// Every visible product.
    ///
    /// Serves the cached snapshot while it is valid unless `force_refresh`
    /// is set; otherwise fetches, or joins the fetch already in flight.
    ///
    /// # Errors
    ///
    /// Returns the fetch error or timeout. Failed fetches are not cached.
    pub async fn get_all_products(
        &self,
        force_refresh: bool,
    ) -> Result<Arc<Vec<Product>>, CatalogError> {
        let snapshot = self.snapshot(ALL_PRODUCTS_KEY, force_refresh).await?;
        Ok(Arc::clone(snapshot.products()))
    }

    #[instrument(skip(self))]
    async fn snapshot(
        &self,
        key: &str,
        force_refresh: bool,
    ) -> Result<Arc<CachedSnapshot>, CatalogError> {
        if !force_refresh
            && let Some(snapshot) = self.fresh_entry(key).await
        {
            debug!("Cache hit");
            return Ok(snapshot);
        }

        self.join_or_start_fetch(key).await
    }

    async fn fresh_entry(&self, key: &str) -> Option<Arc<CachedSnapshot>> {
        self.inner
            .entries
            .get(key)
            .await
            .filter(|snapshot| snapshot.is_valid())
    }

    fn join_or_start_fetch(&self, key: &str) -> SharedFetch {
        let mut in_flight = self
            .inner
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(fetch) = in_flight.get(key) {
            debug!("Joining in-flight fetch");
            return fetch.clone();
        }

        // The fetch runs as its own task so it completes (and clears its
        // in-flight slot) even if every caller gives up waiting.
        let task = tokio::spawn(fetch_and_store(
            Arc::clone(&self.inner),
            key.to_string(),
        ));
        let fetch = async move {
            task.await
                .unwrap_or_else(|e| Err(CatalogError::Source(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared();

        in_flight.insert(key.to_string(), fetch.clone());
        fetch
    }

    /// Featured products (at most 8).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_featured_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(views::featured(&self.get_all_products(false).await?))
    }

    /// Products of one brand, case-insensitive (at most 30).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_brand_products(&self, brand: &str) -> Result<Vec<Product>, CatalogError> {
        Ok(views::by_brand(&self.get_all_products(false).await?, brand))
    }

    /// Recently added or new-badged products (at most 12).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_new_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(views::new_arrivals(
            &self.get_all_products(false).await?,
            chrono::Utc::now(),
        ))
    }

    /// Products on sale (at most 12).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_offers_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(views::offers(&self.get_all_products(false).await?))
    }

    /// Products with no stock (at most 30).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_out_of_stock_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(views::out_of_stock(&self.get_all_products(false).await?))
    }

    /// Text search (at most 30).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn search_products(&self, query: &str) -> Result<Vec<Product>, CatalogError> {
        Ok(views::search(&self.get_all_products(false).await?, query))
    }

    /// Products related to `id` (at most 4).
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_related_products(&self, id: &ProductId) -> Result<Vec<Product>, CatalogError> {
        Ok(views::related(&self.get_all_products(false).await?, id))
    }

    /// Brand names present in the catalog.
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_brands(&self) -> Result<Vec<String>, CatalogError> {
        Ok(views::brands(&self.get_all_products(false).await?))
    }

    /// Look up one product in the snapshot.
    ///
    /// # Errors
    ///
    /// Propagates [`CatalogCache::get_all_products`] errors.
    pub async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, CatalogError> {
        let products = self.get_all_products(false).await?;
        Ok(products.iter().find(|p| &p.id == id).cloned())
    }

    /// Refresh in the background if the snapshot is missing or older than
    /// the prefetch threshold.
    ///
    /// Returns the refresh task when one was started. Failures are logged
    /// and otherwise ignored.
    pub async fn prefetch_products(&self) -> Option<JoinHandle<()>> {
        let threshold = self.inner.options.prefetch_after;
        let stale = self
            .inner
            .entries
            .get(ALL_PRODUCTS_KEY)
            .await
            .is_none_or(|snapshot| snapshot.age() >= threshold);
        if !stale {
            return None;
        }

        let cache = self.clone();
        Some(tokio::spawn(async move {
            match cache.snapshot(ALL_PRODUCTS_KEY, true).await {
                Ok(snapshot) => debug!(count = snapshot.products().len(), "Catalog prefetched"),
                Err(e) => warn!(error = %e, "Background catalog refresh failed"),
            }
        }))
    }

    /// Drop every entry, or only those whose key contains `pattern`.
    #[instrument(skip(self))]
    pub async fn invalidate_cache(&self, pattern: Option<&str>) {
        let Some(pattern) = pattern else {
            self.inner.entries.invalidate_all();
            self.inner.entries.run_pending_tasks().await;
            info!("Catalog cache cleared");
            return;
        };

        let keys: Vec<Arc<String>> = self
            .inner
            .entries
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.inner.entries.invalidate(key.as_str()).await;
        }
        info!(invalidated = keys.len(), "Catalog cache entries invalidated");
    }

    /// Invalidate product snapshots whenever `feed` reports a `products`
    /// row change.
    pub fn watch_changes(&self, feed: &ChangeFeed) -> JoinHandle<()> {
        let mut changes = feed.subscribe();
        let cache = self.clone();

        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.table == PRODUCTS_TABLE => {
                        debug!(kind = ?change.kind, "Product row changed");
                        cache.invalidate_cache(Some(PRODUCTS_TABLE)).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed lagged, dropping product snapshots");
                        cache.invalidate_cache(Some(PRODUCTS_TABLE)).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

#[instrument(skip(inner))]
async fn fetch_and_store(
    inner: Arc<CatalogCacheInner>,
    key: String,
) -> Result<Arc<CachedSnapshot>, CatalogError> {
    let timeout = inner.options.fetch_timeout;

    let result = match tokio::time::timeout(timeout, inner.source.fetch_products()).await {
        Ok(Ok(products)) => {
            info!(count = products.len(), "Catalog fetched");
            let snapshot = Arc::new(CachedSnapshot {
                products: Arc::new(products),
                fetched_at: Instant::now(),
                ttl: inner.options.ttl,
            });
            inner.entries.insert(key.clone(), Arc::clone(&snapshot)).await;
            Ok(snapshot)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Catalog fetch failed");
            Err(e)
        }
        Err(_) => {
            warn!(?timeout, "Catalog fetch timed out");
            Err(CatalogError::Timeout(timeout))
        }
    };

    inner
        .in_flight
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&key);
    result
}
