//! Catalog preview command.
//!
//! Fetches through the same cache the storefront uses and prints the chosen
//! view, one product per line.
//!
//! # Environment Variables
//!
//! - `BACKEND_URL` - Hosted backend base URL
//! - `BACKEND_ANON_KEY` - Public API key

use std::io::Write;
use std::sync::Arc;

use clap::ValueEnum;
use thiserror::Error;
use vitrine_core::Product;
use vitrine_storefront::backend::BackendClient;
use vitrine_storefront::catalog::{CatalogCache, CatalogError, CatalogOptions, ChangeFeed};
use vitrine_storefront::config::{BackendConfig, ConfigError};

/// Views the command can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CatalogView {
    All,
    Featured,
    New,
    Offers,
    OutOfStock,
    Brand,
    Search,
}

/// Errors that can occur while printing a view.
#[derive(Debug, Error)]
pub enum CatalogCommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("The {0} view needs --{1}")]
    MissingArgument(&'static str, &'static str),

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fetch `view` and print it as JSON lines on stdout.
///
/// # Errors
///
/// Returns an error if configuration is missing, the fetch fails, or a
/// required argument for the view is absent.
pub async fn print(
    view: CatalogView,
    brand: Option<&str>,
    query: Option<&str>,
) -> Result<(), CatalogCommandError> {
    dotenvy::dotenv().ok();

    let config = BackendConfig::from_env()?;
    let client = BackendClient::new(&config, ChangeFeed::new());
    let cache = CatalogCache::new(Arc::new(client), CatalogOptions::default());

    let products: Vec<Product> = match view {
        CatalogView::All => cache.get_all_products(false).await?.to_vec(),
        CatalogView::Featured => cache.get_featured_products().await?,
        CatalogView::New => cache.get_new_products().await?,
        CatalogView::Offers => cache.get_offers_products().await?,
        CatalogView::OutOfStock => cache.get_out_of_stock_products().await?,
        CatalogView::Brand => {
            let brand = brand.ok_or(CatalogCommandError::MissingArgument("brand", "brand"))?;
            cache.get_brand_products(brand).await?
        }
        CatalogView::Search => {
            let query = query.ok_or(CatalogCommandError::MissingArgument("search", "query"))?;
            cache.search_products(query).await?
        }
    };

    tracing::info!(view = ?view, count = products.len(), "Catalog view fetched");

    let mut out = std::io::stdout().lock();
    for product in &products {
        serde_json::to_writer(&mut out, product)?;
        writeln!(out)?;
    }
    Ok(())
}
