//! Client for the hosted backend's REST and RPC endpoints.
//!
//! # Architecture
//!
//! - PostgREST-style endpoints under `/rest/v1/`; filters travel as query
//!   parameters (`is_visible=eq.true`)
//! - Every request carries the public `apikey`; admin calls forward the
//!   caller's bearer token so the backend's row-level security decides
//! - Successful admin product updates are published on the [`ChangeFeed`]
//!   so the catalog cache drops its snapshot
//!
//! The backend is the source of truth: nothing here persists catalog data
//! locally.

mod types;

pub use types::{ProductPatch, SettingsPatch, StoreSettings};

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;
use vitrine_core::{Product, ProductId};

use crate::catalog::{CatalogError, CatalogSource, ChangeFeed, ChangeKind, RowChange};
use crate::config::BackendConfig;

const PRODUCTS_PATH: &str = "/rest/v1/products";
const SETTINGS_PATH: &str = "/rest/v1/store_settings";
const RPC_PATH: &str = "/rest/v1/rpc/";

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// Whether the backend rejected the caller's credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

impl From<BackendError> for CatalogError {
    fn from(err: BackendError) -> Self {
        Self::Source(err.to_string())
    }
}

/// Client for the hosted backend.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    feed: ChangeFeed,
}

impl BackendClient {
    /// Create a client publishing admin writes on `feed`.
    #[must_use]
    pub fn new(config: &BackendConfig, feed: ChangeFeed) -> Self {
        Self {
            inner: Arc::new(BackendClientInner {
                client: reqwest::Client::new(),
                base_url: config.url.clone(),
                anon_key: config.anon_key.clone(),
                feed,
            }),
        }
    }

    fn endpoint(&self, path: &str, filters: &[(&str, &str)]) -> Result<Url, BackendError> {
        let mut url = self.inner.base_url.join(path)?;
        if !filters.is_empty() {
            url.query_pairs_mut().extend_pairs(filters);
        }
        Ok(url)
    }

    /// Attach the API key and bearer token (the caller's, or the anon key).
    fn authorized(&self, request: RequestBuilder, bearer: Option<&SecretString>) -> RequestBuilder {
        let token = bearer.unwrap_or(&self.inner.anon_key);
        request
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(token.expose_secret())
    }

    /// Send a request and decode the JSON body.
    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        // Get response body as text first for better error diagnostics
        let response_text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(
                response_text.chars().take(200).collect(),
            ));
        }

        if !status.is_success() {
            error!(
                status = %status,
                body = %response_text.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: response_text.chars().take(200).collect(),
            });
        }

        // Void RPCs answer with an empty body.
        let body = if response_text.trim().is_empty() {
            "null"
        } else {
            response_text.as_str()
        };

        serde_json::from_str(body).map_err(|e| {
            error!(
                error = %e,
                body = %response_text.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    /// Visible, active products in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not parse.
    #[instrument(skip(self))]
    pub async fn fetch_visible_products(&self) -> Result<Vec<Product>, BackendError> {
        let url = self.endpoint(
            PRODUCTS_PATH,
            &[
                ("select", "*"),
                ("is_visible", "eq.true"),
                ("status", "eq.active"),
                ("order", "sort_order.asc,created_at.desc"),
            ],
        )?;
        let request = self.authorized(self.inner.client.get(url), None);
        let products: Vec<Product> = self.execute(request).await?;
        debug!(count = products.len(), "Fetched products");
        Ok(products)
    }

    /// The store settings record, read with the caller's token.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the record does not exist.
    #[instrument(skip(self, token))]
    pub async fn fetch_settings(&self, token: &SecretString) -> Result<StoreSettings, BackendError> {
        let url = self.endpoint(SETTINGS_PATH, &[("select", "*"), ("id", "eq.1")])?;
        let request = self.authorized(self.inner.client.get(url), Some(token));
        let rows: Vec<StoreSettings> = self.execute(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("store settings".to_string()))
    }

    /// Apply `patch` to the store settings record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the update.
    #[instrument(skip(self, token, patch))]
    pub async fn update_settings(
        &self,
        token: &SecretString,
        patch: &SettingsPatch,
    ) -> Result<StoreSettings, BackendError> {
        let url = self.endpoint(SETTINGS_PATH, &[("id", "eq.1")])?;
        let request = self
            .authorized(self.inner.client.patch(url), Some(token))
            .header("Prefer", "return=representation")
            .json(patch);
        let rows: Vec<StoreSettings> = self.execute(request).await?;
        let settings = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("store settings".to_string()))?;

        self.inner.feed.publish(RowChange {
            table: "store_settings".to_string(),
            kind: ChangeKind::Update,
            record: Some(serde_json::to_value(&settings)?),
        });
        Ok(settings)
    }

    /// Invoke the stored procedure `name` with `args`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the result does not decode as `T`.
    #[instrument(skip(self, args))]
    pub async fn rpc<T, A>(&self, name: &str, args: &A) -> Result<T, BackendError>
    where
        T: DeserializeOwned,
        A: Serialize + Sync + ?Sized,
    {
        let url = self.endpoint(&format!("{RPC_PATH}{name}"), &[])?;
        let request = self
            .authorized(self.inner.client.post(url), None)
            .json(args);
        self.execute(request).await
    }

    /// Apply an admin `patch` to product `id` and publish the change.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if no row matched (including rows
    /// hidden from the caller by row-level security).
    #[instrument(skip(self, token, patch), fields(product_id = %id))]
    pub async fn update_product(
        &self,
        token: &SecretString,
        id: &ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError> {
        let filter = format!("eq.{id}");
        let url = self.endpoint(PRODUCTS_PATH, &[("id", filter.as_str())])?;
        let request = self
            .authorized(self.inner.client.patch(url), Some(token))
            .header("Prefer", "return=representation")
            .json(patch);

        let rows: Vec<serde_json::Value> = self.execute(request).await?;
        let record = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;
        let product: Product = serde_json::from_value(record.clone())?;

        self.inner
            .feed
            .publish(RowChange::product(ChangeKind::Update, Some(record)));
        Ok(product)
    }
}

#[async_trait]
impl CatalogSource for BackendClient {
    async fn fetch_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.fetch_visible_products().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> BackendClient {
        BackendClient::new(
            &BackendConfig {
                url: Url::parse("https://abc.backend.test").unwrap(),
                anon_key: SecretString::from("anon"),
            },
            ChangeFeed::new(),
        )
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::NotFound("product w1".to_string());
        assert_eq!(err.to_string(), "Not found: product w1");

        let err = BackendError::RateLimited(30);
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
    }

    #[test]
    fn test_unauthorized_statuses() {
        let forbidden = BackendError::Status {
            status: 403,
            message: String::new(),
        };
        assert!(forbidden.is_unauthorized());
        assert!(!BackendError::RateLimited(1).is_unauthorized());
    }

    #[test]
    fn test_catalog_error_from_backend_error() {
        let err: CatalogError = BackendError::NotFound("x".to_string()).into();
        assert!(matches!(err, CatalogError::Source(msg) if msg == "Not found: x"));
    }

    #[test]
    fn test_endpoint_encodes_filters() {
        let url = client()
            .endpoint(PRODUCTS_PATH, &[("id", "eq.w 1"), ("order", "a.asc,b.desc")])
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/products");
        assert_eq!(url.query(), Some("id=eq.w+1&order=a.asc%2Cb.desc"));
    }

    #[test]
    fn test_rpc_endpoint() {
        let url = client()
            .endpoint(&format!("{RPC_PATH}get_public_settings"), &[])
            .unwrap();
        assert_eq!(url.as_str(), "https://abc.backend.test/rest/v1/rpc/get_public_settings");
    }
}
