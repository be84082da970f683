//! The storefront router driven end to end with `oneshot`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::Router;
use axum::http::{Method, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use vitrine_integration_tests::{
    FakeCatalog, TEST_PHONE, TabHeaders, request, sample_catalog, send, test_state,
};
use vitrine_storefront::routes;

fn app_with(source: &Arc<FakeCatalog>) -> Router {
    routes::app(test_state(Arc::clone(source)))
}

fn app() -> Router {
    app_with(&Arc::new(FakeCatalog::new(sample_catalog())))
}

fn ids(body: &Value) -> Vec<&str> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect()
}

fn add_body(id: &str, quantity: u32) -> Value {
    json!({
        "product": {"id": id, "name": "Speedmaster", "price": "R$ 1.000,00", "image": "x", "brand": "Omega"},
        "quantity": quantity,
    })
}

fn messages(body: &Value) -> Vec<&str> {
    body["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["message"].as_str().unwrap())
        .collect()
}

#[tokio::test]
async fn health_answers_ok() {
    let response = app()
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn request_id_is_echoed() {
    let mut req = request(Method::GET, "/health", None, None);
    req.headers_mut()
        .insert("x-request-id", "trace-123".parse().unwrap());

    let response = app().oneshot(req).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "trace-123");
}

#[tokio::test(start_paused = true)]
async fn catalog_views_are_served() {
    let app = app();

    let (status, body) = send(&app, request(Method::GET, "/api/products", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(ids(&body).contains(&"w1"));

    let (_, body) = send(&app, request(Method::GET, "/api/products/featured", None, None)).await;
    assert_eq!(ids(&body), vec!["w1"]);

    let (_, body) = send(&app, request(Method::GET, "/api/products/offers", None, None)).await;
    assert_eq!(ids(&body), vec!["w2"]);

    let (_, body) = send(&app, request(Method::GET, "/api/products/search?q=tissot", None, None)).await;
    assert_eq!(ids(&body), vec!["w4"]);

    let (_, body) = send(&app, request(Method::GET, "/api/brands", None, None)).await;
    assert_eq!(body, json!(["Omega", "Rolex", "Tissot"]));

    let (status, body) = send(&app, request(Method::GET, "/api/products/w3", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["brand"], "Rolex");
}

#[tokio::test(start_paused = true)]
async fn unknown_product_is_404() {
    let (status, body) = send(&app(), request(Method::GET, "/api/products/nope", None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}

#[tokio::test(start_paused = true)]
async fn catalog_failure_is_bad_gateway() {
    let source = Arc::new(FakeCatalog::new(sample_catalog()));
    source.set_failing(true);

    let (status, body) = send(&app_with(&source), request(Method::GET, "/api/products", None, None)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body["error"].as_str().unwrap().contains("backend unavailable"));
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_a_refetch() {
    let source = Arc::new(FakeCatalog::new(sample_catalog()));
    let app = app_with(&source);

    send(&app, request(Method::GET, "/api/products", None, None)).await;
    send(&app, request(Method::GET, "/api/products", None, None)).await;
    assert_eq!(source.fetches(), 1);

    let (status, _) = send(&app, request(Method::POST, "/api/catalog/invalidate", None, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(&app, request(Method::GET, "/api/products", None, None)).await;
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn cart_requires_tab_headers() {
    let (status, _) = send(&app(), request(Method::GET, "/api/cart", None, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad = TabHeaders::new("device", "tab/1");
    let (status, _) = send(&app(), request(Method::GET, "/api/cart", Some(&bad), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn cart_lifecycle() {
    let app = app();
    let tab = TabHeaders::new("device-1", "tab-1");

    let (status, body) = send(&app, request(Method::POST, "/api/cart/items", Some(&tab), Some(add_body("w1", 2)))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_items"], 2);
    assert_eq!(body["total"], "R$ 2.000,00");
    assert_eq!(body["items"][0]["line_total"], "R$ 2.000,00");
    assert_eq!(messages(&body), vec!["Speedmaster adicionado ao carrinho!"]);

    let (_, body) = send(&app, request(Method::GET, "/api/cart", Some(&tab), None)).await;
    assert_eq!(body["total_items"], 2);
    assert!(messages(&body).is_empty());

    let (_, body) = send(
        &app,
        request(Method::PATCH, "/api/cart/items/w1", Some(&tab), Some(json!({"quantity": 5}))),
    )
    .await;
    assert_eq!(body["total_items"], 5);

    send(&app, request(Method::POST, "/api/cart/items", Some(&tab), Some(add_body("w2", 1)))).await;
    let (_, body) = send(&app, request(Method::DELETE, "/api/cart/items/w1", Some(&tab), None)).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["id"], "w2");

    let (_, body) = send(&app, request(Method::DELETE, "/api/cart", Some(&tab), None)).await;
    assert_eq!(body["total_items"], 0);
    assert_eq!(body["total"], "R$ 0,00");
}

#[tokio::test(start_paused = true)]
async fn partial_product_is_accepted_with_defaults() {
    let app = app();
    let tab = TabHeaders::new("device-1", "tab-1");

    let (status, body) = send(
        &app,
        request(Method::POST, "/api/cart/items", Some(&tab), Some(json!({"product": {"id": "x1"}}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["name"], "Produto");
    assert_eq!(body["items"][0]["price"], "R$ 0,00");
    assert_eq!(body["total_items"], 1);
}

#[tokio::test(start_paused = true)]
async fn tabs_of_one_device_share_the_cart() {
    let app = app();
    let first = TabHeaders::new("device-1", "tab-1");
    let second = TabHeaders::new("device-1", "tab-2");
    let other_device = TabHeaders::new("device-2", "tab-1");

    send(&app, request(Method::POST, "/api/cart/items", Some(&first), Some(add_body("w1", 1)))).await;
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    let (_, body) = send(&app, request(Method::GET, "/api/cart", Some(&second), None)).await;
    assert_eq!(body["total_items"], 1);

    let (_, body) = send(&app, request(Method::GET, "/api/cart", Some(&other_device), None)).await;
    assert_eq!(body["total_items"], 0);
}

#[tokio::test(start_paused = true)]
async fn signed_in_user_gets_a_separate_cart() {
    let app = app();
    let guest = TabHeaders::new("device-1", "tab-1");
    let member = TabHeaders::new("device-1", "tab-1").signed_in("42");

    send(&app, request(Method::POST, "/api/cart/items", Some(&guest), Some(add_body("w1", 1)))).await;

    let (_, body) = send(&app, request(Method::GET, "/api/cart", Some(&member), None)).await;
    assert_eq!(body["total_items"], 0);
    assert_eq!(body["namespace"], json!({"kind": "user", "user_id": "42"}));

    let (_, body) = send(&app, request(Method::GET, "/api/cart", Some(&guest), None)).await;
    assert_eq!(body["total_items"], 1);
}

#[tokio::test(start_paused = true)]
async fn checkout_of_empty_cart_is_unprocessable() {
    let tab = TabHeaders::new("device-1", "tab-1");
    let (status, body) = send(&app(), request(Method::POST, "/api/cart/checkout", Some(&tab), None)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Seu carrinho está vazio");
}

#[tokio::test(start_paused = true)]
async fn checkout_returns_whatsapp_link() {
    let app = app();
    let tab = TabHeaders::new("device-1", "tab-1");
    send(&app, request(Method::POST, "/api/cart/items", Some(&tab), Some(add_body("w1", 2)))).await;

    let (status, body) = send(&app, request(Method::POST, "/api/cart/checkout", Some(&tab), None)).await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("https://wa.me/{TEST_PHONE}?text=")));
    assert!(url.contains("Speedmaster"));
    assert_eq!(body["notifications"][0]["kind"], "success");
}

#[tokio::test(start_paused = true)]
async fn favorites_toggle() {
    let app = app();
    let tab = TabHeaders::new("device-1", "tab-1");

    let (_, body) = send(&app, request(Method::POST, "/api/favorites/w1/toggle", Some(&tab), None)).await;
    assert_eq!(body["is_favorite"], true);
    assert_eq!(body["count"], 1);
    assert_eq!(messages(&body), vec!["Produto adicionado aos favoritos"]);

    let (_, body) = send(&app, request(Method::POST, "/api/favorites/w1/toggle", Some(&tab), None)).await;
    assert_eq!(body["is_favorite"], false);
    assert_eq!(body["count"], 0);

    let (_, body) = send(&app, request(Method::GET, "/api/favorites", Some(&tab), None)).await;
    assert_eq!(body["favorites"], json!([]));
    assert!(body.get("is_favorite").is_none());
}

#[tokio::test]
async fn admin_requires_bearer_token() {
    let (status, _) = send(&app(), request(Method::GET, "/api/admin/settings", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
