//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                       - Health check
//!
//! # Catalog
//! GET    /api/products                 - All visible products (?refresh=true)
//! GET    /api/products/featured        - Featured (max 8)
//! GET    /api/products/new             - New arrivals (max 12)
//! GET    /api/products/offers          - On sale (max 12)
//! GET    /api/products/out-of-stock    - Out of stock (max 30)
//! GET    /api/products/brand/{brand}   - One brand (max 30)
//! GET    /api/products/search?q=       - Search (max 30)
//! GET    /api/products/{id}            - Product detail
//! GET    /api/products/{id}/related    - Related products (max 4)
//! GET    /api/brands                   - Brand names
//! POST   /api/catalog/invalidate       - Drop cached snapshots (?pattern=)
//! GET    /api/settings/public          - Public store settings
//!
//! # Cart (X-Device-Id, X-Tab-Id, optional X-User-Id)
//! GET    /api/cart                     - Cart with totals
//! POST   /api/cart/items               - Add {product, quantity}
//! PATCH  /api/cart/items/{id}          - Set {quantity}
//! DELETE /api/cart/items/{id}          - Remove line
//! DELETE /api/cart                     - Clear
//! POST   /api/cart/checkout            - WhatsApp order link
//!
//! # Favorites (same headers as cart)
//! GET    /api/favorites                - Favorite ids
//! POST   /api/favorites/{id}/toggle    - Toggle membership
//!
//! # Admin (Authorization: Bearer)
//! GET    /api/admin/settings           - Store settings
//! PUT    /api/admin/settings           - Update store settings
//! PATCH  /api/admin/products/{id}      - Update product
//! ```

pub mod admin;
pub mod cart;
pub mod favorites;
pub mod products;

use axum::{
    Router,
    body::Body,
    http::Request,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/featured", get(products::featured))
        .route("/new", get(products::new_arrivals))
        .route("/offers", get(products::offers))
        .route("/out-of-stock", get(products::out_of_stock))
        .route("/brand/{brand}", get(products::by_brand))
        .route("/search", get(products::search))
        .route("/{id}", get(products::show))
        .route("/{id}/related", get(products::related))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/items", post(cart::add))
        .route("/items/{id}", patch(cart::update).delete(cart::remove))
        .route("/checkout", post(cart::checkout))
}

/// Create the favorites routes router.
pub fn favorite_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(favorites::show))
        .route("/{id}/toggle", post(favorites::toggle))
}

/// Create the admin routes router.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/settings",
            get(admin::settings).put(admin::update_settings),
        )
        .route("/products/{id}", patch(admin::update_product))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/api/products", product_routes())
        .route("/api/brands", get(products::brands))
        .route("/api/catalog/invalidate", post(products::invalidate))
        .route("/api/settings/public", get(products::public_settings))
        .nest("/api/cart", cart_routes())
        .nest("/api/favorites", favorite_routes())
        .nest("/api/admin", admin_routes())
}

/// The complete application: routes, state, and the request middleware.
///
/// Sentry layers are added by the binary, outside this stack.
pub fn app(state: AppState) -> Router {
    routes()
        .with_state(state)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                    tab_id = tracing::field::Empty,
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}
