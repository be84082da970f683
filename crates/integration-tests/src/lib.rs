//! Integration tests for Vitrine.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p vitrine-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `catalog_cache` - Coalescing, TTL, invalidation against a fake source
//! - `cart_sync` - Cross-tab sync and namespace isolation over shared storage
//! - `http_api` - The axum router driven with `tower::ServiceExt::oneshot`
//!
//! Nothing here needs a database or network: the catalog source is
//! [`FakeCatalog`] and storage is the in-memory backend.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Notify;
use tower::ServiceExt;
use url::Url;
use vitrine_core::Product;
use vitrine_storefront::backend::BackendClient;
use vitrine_storefront::catalog::{CatalogError, CatalogOptions, CatalogSource, ChangeFeed};
use vitrine_storefront::config::{BackendConfig, StorefrontConfig};
use vitrine_storefront::middleware::{DEVICE_ID_HEADER, TAB_ID_HEADER, USER_ID_HEADER};
use vitrine_storefront::state::AppState;
use vitrine_storefront::storage::MemoryBackend;

/// Checkout phone used by [`test_config`].
pub const TEST_PHONE: &str = "5511999990000";

/// Catalog source serving a fixed product list, counting fetches.
pub struct FakeCatalog {
    fetches: AtomicUsize,
    products: Mutex<Vec<Product>>,
    gate: Option<Arc<Notify>>,
    fail: AtomicBool,
}

impl FakeCatalog {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            products: Mutex::new(products),
            gate: None,
            fail: AtomicBool::new(false),
        }
    }

    /// A source whose fetches wait for `gate` to be notified.
    #[must_use]
    pub fn gated(products: Vec<Product>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(products)
        }
    }

    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_products(&self, products: Vec<Product>) {
        *self.products.lock().unwrap() = products;
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Source("backend unavailable".to_string()));
        }
        Ok(self.products.lock().unwrap().clone())
    }
}

/// A visible, active, in-stock product.
#[must_use]
pub fn product(id: &str, brand: &str) -> Product {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "name": format!("Relógio {id}"),
        "brand": brand,
        "price": "R$ 1.000,00",
        "image": format!("https://cdn.test/{id}.jpg"),
        "stock_quantity": 3,
        "category": "pulso",
    }))
    .unwrap()
}

/// A small catalog covering every storefront view.
#[must_use]
pub fn sample_catalog() -> Vec<Product> {
    let mut featured = product("w1", "Omega");
    featured.is_featured = true;

    let mut on_sale = product("w2", "Omega");
    on_sale.original_price = Some("R$ 1.500,00".to_string());

    let mut sold_out = product("w3", "Rolex");
    sold_out.stock_quantity = Some(0);

    let mut fresh = product("w4", "Tissot");
    fresh.badges = vec!["Novo".to_string()];

    let mut hidden = product("w5", "Omega");
    hidden.is_visible = false;

    vec![featured, on_sale, sold_out, fresh, hidden]
}

/// Configuration that never reaches a real backend.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: None,
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        backend: BackendConfig {
            url: Url::parse("http://127.0.0.1:9").unwrap(),
            anon_key: SecretString::from("test-anon-key"),
        },
        whatsapp_phone: TEST_PHONE.to_string(),
        catalog: CatalogOptions::default(),
        cart_persist_debounce: Duration::from_millis(300),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Application state over `source` and fresh in-memory storage.
#[must_use]
pub fn test_state(source: Arc<FakeCatalog>) -> AppState {
    let config = test_config();
    let feed = ChangeFeed::new();
    let backend = BackendClient::new(&config.backend, feed.clone());
    AppState::from_parts(
        config,
        source,
        backend,
        Arc::new(MemoryBackend::new()),
        feed,
    )
}

/// Identifies one browser tab for cart and favorites requests.
#[derive(Debug, Clone)]
pub struct TabHeaders {
    pub device: String,
    pub tab: String,
    pub user: Option<String>,
}

impl TabHeaders {
    #[must_use]
    pub fn new(device: &str, tab: &str) -> Self {
        Self {
            device: device.to_string(),
            tab: tab.to_string(),
            user: None,
        }
    }

    #[must_use]
    pub fn signed_in(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }
}

/// Build a request, optionally addressed to a tab and carrying JSON.
#[must_use]
pub fn request(method: Method, uri: &str, tab: Option<&TabHeaders>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(tab) = tab {
        builder = builder
            .header(DEVICE_ID_HEADER, &tab.device)
            .header(TAB_ID_HEADER, &tab.tab);
        if let Some(user) = &tab.user {
            builder = builder.header(USER_ID_HEADER, user);
        }
    }

    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Send `request` through `app`; returns the status and the JSON body
/// (`Value::Null` when the body is not JSON).
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
